use std::fs::File;
use std::io::Read;
use std::path::Path;

use tensorflow::{Graph, ImportGraphDefOptions, Session, SessionOptions, SessionRunArgs, Tensor};

use crate::error::ModelError;
use crate::preprocess::ImageTensor;

/// A frozen classifier mapping one preprocessed image to one raw score per
/// class. Implementations must be safe to share across concurrent requests.
pub trait Classifier: Send + Sync {
    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

/// Classifier backed by a frozen TensorFlow graph.
pub struct TfClassifier {
    session: Session,
    graph: Graph,
    input_op: String,
    output_op: String,
}

impl TfClassifier {
    pub fn load(
        model_path: impl AsRef<Path>,
        input_op: &str,
        output_op: &str,
    ) -> Result<Self, ModelError> {
        let mut graph = Graph::new();
        let mut model_file = File::open(model_path)?;
        let mut model_bytes = Vec::new();
        model_file.read_to_end(&mut model_bytes)?;

        graph.import_graph_def(&model_bytes, &ImportGraphDefOptions::new())?;

        let session = Session::new(&SessionOptions::new(), &graph)?;

        let classifier = TfClassifier {
            session,
            graph,
            input_op: input_op.to_string(),
            output_op: output_op.to_string(),
        };

        // Fail at startup rather than on the first request.
        classifier.operation(&classifier.input_op)?;
        classifier.operation(&classifier.output_op)?;

        Ok(classifier)
    }

    fn operation(&self, name: &str) -> Result<tensorflow::Operation, ModelError> {
        self.graph
            .operation_by_name(name)?
            .ok_or_else(|| ModelError::MissingOperation(name.to_string()))
    }
}

impl Classifier for TfClassifier {
    fn scores(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        let mut input_tensor = Tensor::<f32>::new(&input.dims);
        input_tensor.copy_from_slice(&input.data);

        let input_operation = self.operation(&self.input_op)?;
        let output_operation = self.operation(&self.output_op)?;

        let mut args = SessionRunArgs::new();
        args.add_feed(&input_operation, 0, &input_tensor);
        let output_token = args.request_fetch(&output_operation, 0);
        self.session.run(&mut args)?;

        let output_tensor: Tensor<f32> = args.fetch(output_token)?;
        let scores = output_tensor.to_vec();
        if scores.is_empty() {
            return Err(ModelError::EmptyOutput);
        }
        Ok(scores)
    }
}
