use gpu_orchestrator::configuration::get_configuration;
use gpu_orchestrator::telemetry::init_tracing;
use gpu_orchestrator::{startup, Result};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let settings = get_configuration()?;
    startup::launch(settings).await
}
