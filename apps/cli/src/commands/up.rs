//! `tandem up`: provision everything a training run needs in one go.

use colored::Colorize;
use tandem_control::{ProvisionRequest, provision};

use super::deployment::deployment_config;
use super::trainer::job_config;
use super::types::UpArgs;
use crate::context::AppContext;
use crate::output::{print_deployment_info, print_endpoint, print_json};

pub async fn execute(ctx: &AppContext, args: UpArgs) -> anyhow::Result<()> {
    let policy = job_config(ctx, args.trainer)?;

    let mut request = ProvisionRequest::new(policy.clone());
    if args.reference || args.reference_model.is_some() {
        let mut reference = policy.clone();
        if let Some(model) = args.reference_model {
            reference.base_model = model;
        }
        reference.display_name = policy.display_name.as_ref().map(|name| format!("{name}-reference"));
        request.reference = Some(reference);
    }
    if let Some(deployment_id) = args.deployment {
        request.policy.hot_load_deployment_id = Some(deployment_id.clone());
        request.deployment =
            Some(deployment_config(deployment_id, policy.base_model.clone(), policy.region.clone(), &args.deployment_spec));
        request.force_recreate_deployment = args.deployment_spec.force_recreate;
    }

    let provisioned = provision(&ctx.jobs, &ctx.deployments, &request).await?;

    if args.json || ctx.json {
        return print_json(&provisioned);
    }
    println!("{}", "Provisioned".bold().cyan());
    print_endpoint("Policy trainer", &provisioned.policy);
    if let Some(reference) = &provisioned.reference {
        print_endpoint("Reference trainer", reference);
    }
    if let Some(deployment) = &provisioned.deployment {
        print_deployment_info("Deployment", deployment);
    }
    Ok(())
}
