use std::sync::Arc;

use image_classifier_service::{
    labels::LabelTable,
    model::TfClassifier,
    router,
    utils::ensure_files_exist,
    AppState, InferenceService, Settings,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_classifier_service=info,tower_http=info".into()),
        )
        .init();

    let settings = Settings::from_env()?;
    ensure_files_exist(&settings).await?;
    tokio::fs::create_dir_all(&settings.upload_dir).await?;

    let classifier = TfClassifier::load(
        &settings.model_path,
        &settings.input_op,
        &settings.output_op,
    )?;
    let labels = LabelTable::load(&settings.class_list_path)?;
    tracing::info!(
        model = %settings.model_path.display(),
        labels = labels.len(),
        policy = ?settings.policy,
        "model loaded"
    );

    let service = InferenceService::new(
        Box::new(classifier),
        labels,
        settings.layout,
        settings.policy,
    );
    let classes = service.warm_up()?;
    tracing::info!(classes, "warm-up inference succeeded");

    let state = Arc::new(AppState {
        service: Arc::new(service),
        upload_dir: settings.upload_dir.clone(),
        body_limit_bytes: settings.body_limit_bytes,
    });
    let app = router(state);

    let addr = settings.socket_addr()?;
    tracing::info!("Listening on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;

    Ok(())
}
