use std::path::Path;

use crate::error::ModelError;

/// Class names indexed by classifier output position.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    /// Loads a JSON array of strings (`*.json`) or a plain list with one label
    /// per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            Self::from_json(&contents)
        } else {
            Self::from_lines(&contents)
        }
    }

    pub fn from_json(contents: &str) -> Result<Self, ModelError> {
        let labels: Vec<String> =
            serde_json::from_str(contents).map_err(|e| ModelError::Labels(e.to_string()))?;
        Self::new(labels)
    }

    /// Line `i` is the label for output `i`. Trailing blank lines are
    /// ignored; a blank line anywhere else would shift every later label, so
    /// it is rejected.
    pub fn from_lines(contents: &str) -> Result<Self, ModelError> {
        let mut labels: Vec<String> = contents.lines().map(|l| l.trim().to_string()).collect();
        while labels.last().is_some_and(|l| l.is_empty()) {
            labels.pop();
        }
        if let Some(line) = labels.iter().position(|l| l.is_empty()) {
            return Err(ModelError::Labels(format!("blank label on line {}", line + 1)));
        }
        Self::new(labels)
    }

    pub fn new(labels: Vec<String>) -> Result<Self, ModelError> {
        if labels.is_empty() {
            return Err(ModelError::Labels("label table is empty".into()));
        }
        Ok(LabelTable { labels })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_list_is_positional() {
        let table = LabelTable::from_lines("tench\ngoldfish\r\n  great white shark \n\n\n").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some("goldfish"));
        assert_eq!(table.get(2), Some("great white shark"));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn interior_blank_line_is_rejected() {
        let err = LabelTable::from_lines("tench\n\ngoldfish\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn json_array_keeps_order() {
        let table = LabelTable::from_json(r#"["laptop", "cellular telephone"]"#).unwrap();
        assert_eq!(table.get(0), Some("laptop"));
        assert_eq!(table.get(1), Some("cellular telephone"));
    }

    #[test]
    fn empty_table_is_rejected() {
        assert!(LabelTable::from_lines("\n\n").is_err());
        assert!(LabelTable::from_json("[]").is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = LabelTable::from_json("{\"0\": \"tench\"}").unwrap_err();
        assert!(matches!(err, ModelError::Labels(_)));
    }
}
