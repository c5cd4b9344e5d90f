use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use crate::client::ForgeClient;

use super::print_result;

pub async fn retry(client: &ForgeClient, deployment_id: Uuid) -> Result<()> {
    let result = client.retry_deployment(deployment_id).await?;
    println!("{}", "retry queued".green());
    print_result(&result);
    Ok(())
}
