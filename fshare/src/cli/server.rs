use server::config::Config;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    server::run(config).await
}
