use anyhow::Result;
use colored::Colorize;
use uuid::Uuid;

use crate::client::ForgeClient;

use super::print_result;

pub async fn temp_deps(
    client: &ForgeClient,
    release_app_id: Uuid,
    depends_on: Vec<Uuid>,
    unset: bool,
) -> Result<()> {
    let temp_depends_on = if unset { None } else { Some(depends_on) };
    let result = client.update_temp_deps(release_app_id, temp_depends_on).await?;
    print_result(&result);
    Ok(())
}

pub async fn trigger_deploy(
    client: &ForgeClient,
    release_app_id: Uuid,
    new_build_id: Uuid,
    env: String,
) -> Result<()> {
    let result = client.trigger_deploy(release_app_id, new_build_id, env).await?;
    println!("{}", "deploy triggered".green());
    print_result(&result);
    Ok(())
}

pub async fn manual_deploy(client: &ForgeClient, release_app_id: Uuid, env: String) -> Result<()> {
    let result = client.manual_deploy(release_app_id, env).await?;
    println!("{}", "manual deploy triggered".green());
    print_result(&result);
    Ok(())
}
