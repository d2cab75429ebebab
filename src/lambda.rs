use jluszcz_rust_utils::lambda;
use lambda_runtime::{LambdaEvent, service_fn};
use proposalsync::APP_NAME;
use proposalsync::config::Config;
use proposalsync::error::SyncError;
use proposalsync::http::{HttpResponse, respond};
use serde_json::Value;

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    lambda::init(APP_NAME, module_path!(), false).await?;
    let func = service_fn(handler);
    lambda_runtime::run(func).await?;
    Ok(())
}

async fn handler(event: LambdaEvent<Value>) -> Result<Value, lambda_runtime::Error> {
    let response = match Config::from_env() {
        Ok(config) => respond(&config, &event.payload).await,
        Err(e) => HttpResponse::from_result(Err(SyncError::Initialization(e))),
    };

    Ok(response.into_event())
}
