pub mod server;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        let result = match self {
            Self::Server(args) => server::execute(args).await,
        };
        crate::cli::telemetry::shutdown_tracer();
        result
    }
}
