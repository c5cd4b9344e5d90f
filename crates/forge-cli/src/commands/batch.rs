use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use crate::client::ForgeClient;

use super::print_result;

#[allow(clippy::too_many_arguments)]
pub async fn create(
    client: &ForgeClient,
    batch_number: String,
    project_id: Uuid,
    initiator: String,
    release_notes: Option<String>,
    app_ids: Vec<Uuid>,
) -> Result<()> {
    let result = client
        .create_batch(batch_number, project_id, initiator, release_notes, app_ids)
        .await?;
    println!("{}", "batch created".green());
    print_result(&result);
    Ok(())
}

pub async fn delete(client: &ForgeClient, batch_id: Uuid) -> Result<()> {
    client.delete_batch(batch_id).await?;
    println!("{}", "batch deleted".green());
    Ok(())
}

pub async fn get(client: &ForgeClient, id: Uuid) -> Result<()> {
    let result = client.get_batch(id).await?;
    print_result(&result);
    Ok(())
}

pub async fn list(client: &ForgeClient, initiator: Option<String>, keyword: Option<String>) -> Result<()> {
    let result = client.list_batches(initiator, keyword).await?;
    print_result(&result);
    Ok(())
}

pub async fn seal(client: &ForgeClient, batch_id: Uuid, operator: String) -> Result<()> {
    let result = client
        .batch_action(batch_id, "seal".to_string(), operator, None)
        .await?;
    println!("{}", "batch sealed".green());
    print_result(&result);
    Ok(())
}

pub async fn action(
    client: &ForgeClient,
    batch_id: Uuid,
    action: String,
    operator: String,
    reason: Option<String>,
) -> Result<()> {
    let result = client.batch_action(batch_id, action, operator, reason).await?;
    print_result(&result);
    Ok(())
}

pub async fn approve(client: &ForgeClient, batch_id: Uuid, operator: String) -> Result<()> {
    let result = client.approve_batch(batch_id, operator).await?;
    println!("{}", "batch approved".green());
    print_result(&result);
    Ok(())
}

pub async fn reject(
    client: &ForgeClient,
    batch_id: Uuid,
    operator: String,
    reason: Option<String>,
) -> Result<()> {
    let result = client.reject_batch(batch_id, operator, reason).await?;
    println!("{}", "batch rejected".red());
    print_result(&result);
    Ok(())
}

pub async fn set_builds(client: &ForgeClient, batch_id: Uuid, selections: Vec<(Uuid, Uuid)>) -> Result<()> {
    let result = client.update_release_app_builds(batch_id, selections).await?;
    print_result(&result);
    Ok(())
}
