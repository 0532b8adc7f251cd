//! Names command - print the resource names derived from the configuration

use clap::Args;

use pipewright_common::naming::{ResourceNames, BUILD_SPEC_FILE};

use super::SettingsArgs;
use crate::Result;

/// Print the resource names derived from the configuration
#[derive(Args, Debug)]
pub struct NamesArgs {
    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// `label: value` rows in display order
pub fn rows(names: &ResourceNames) -> Vec<(&'static str, String)> {
    vec![
        ("cluster", names.cluster.clone()),
        ("admin role", names.admin_role.clone()),
        ("ebs csi role", names.ebs_role.clone()),
        ("repository", names.repository.clone()),
        ("push url", names.push_url.clone()),
        ("image repository", names.image_repository.clone()),
        ("secret", names.secret.clone()),
        ("build role", names.build_role.clone()),
        ("build role arn", names.build_role_arn.clone()),
        ("devops stack", names.devops_stack.clone()),
        ("cluster config stack", names.cluster_config_stack.clone()),
        (
            "branches",
            format!("{}, {}", names.primary_branch, names.secondary_branch),
        ),
        ("build spec", BUILD_SPEC_FILE.to_string()),
    ]
}

/// Run the names command
pub fn run(args: NamesArgs) -> Result<()> {
    let settings = args.settings.load()?;
    let names = ResourceNames::derive(&settings);
    let rows = rows(&names);
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, value) in rows {
        println!("{:width$}  {}", label, value, width = width);
    }
    Ok(())
}
