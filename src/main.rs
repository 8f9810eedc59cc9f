use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    research_fetch_proxy::start_server().await?;
    Ok(())
}
