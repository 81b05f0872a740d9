mod admin;
mod app;
mod config;
mod error;
mod fallback;
mod identity;
mod presence;
mod prompting;
mod registry;
mod router;
mod types;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
