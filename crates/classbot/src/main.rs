use std::sync::Arc;

use classbot_core::{config::Config, relay::CompletionClient};
use classbot_openai::OpenAiClient;

#[tokio::main]
async fn main() -> Result<(), classbot_core::Error> {
    classbot_core::logging::init("classbot")?;

    let cfg = Arc::new(Config::load()?);

    let completion: Option<Arc<dyn CompletionClient>> = cfg
        .openai_api_key
        .as_ref()
        .map(|key| {
            Arc::new(OpenAiClient::new(key.clone(), cfg.completion_model.clone()))
                as Arc<dyn CompletionClient>
        });

    classbot_discord::router::run_gateway(cfg, completion)
        .await
        .map_err(|e| classbot_core::Error::Platform(format!("discord bot failed: {e}")))?;

    Ok(())
}
