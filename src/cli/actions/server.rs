use crate::campanile;
use crate::cli::actions::Action;
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, dsn, config } => {
            // Catch a malformed DSN before the pool does.
            let dsn = Url::parse(&dsn)?;

            campanile::new(port, dsn.to_string(), config).await?;
        }
    }

    Ok(())
}
