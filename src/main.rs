mod app;
mod backend;
mod commands;
mod config;
mod error;
mod logging;
mod media;
mod profile;
mod session;
mod setup;
mod ui;
mod voice;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
