//! Stack output lookup

use tracing::{debug, warn};

use pipewright_common::{Error, Result};

use crate::StackApi;

/// Key fragment of the build role ARN output on the pipeline stack
pub const BUILD_ROLE_OUTPUT_KEY: &str = "RoleBuildProject";

/// ARN of the build role exported by the pipeline stack.
///
/// Prefers the output whose key names the build role; stacks that export it
/// under another key fall back to their last output.
pub async fn build_role_arn(api: &dyn StackApi, stack: &str) -> Result<String> {
    let outputs = api.describe_stack_outputs(stack).await?;

    if let Some(output) = outputs
        .iter()
        .find(|o| o.key.contains(BUILD_ROLE_OUTPUT_KEY))
    {
        debug!(stack = %stack, key = %output.key, "Found build role output");
        return Ok(output.value.clone());
    }

    let last = outputs.last().ok_or_else(|| {
        Error::aws(
            "cloudformation describe-stacks",
            format!("stack {} has no outputs", stack),
        )
    })?;
    warn!(
        stack = %stack,
        key = %last.key,
        "No build role output key found, using the last stack output"
    );
    Ok(last.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockStackApi, StackOutput};

    fn output(key: &str, value: &str) -> StackOutput {
        StackOutput {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn prefers_the_build_role_output() {
        let mut api = MockStackApi::new();
        api.expect_describe_stack_outputs().returning(|_| {
            Ok(vec![
                output("ARNRoleBuildProject", "arn:aws:iam::1:role/BuildAdminRole02"),
                output("PipelineName", "pipeline-02"),
            ])
        });

        let arn = build_role_arn(&api, "DevopsStack02").await.unwrap();
        assert_eq!(arn, "arn:aws:iam::1:role/BuildAdminRole02");
    }

    #[tokio::test]
    async fn falls_back_to_the_last_output() {
        let mut api = MockStackApi::new();
        api.expect_describe_stack_outputs()
            .returning(|_| Ok(vec![output("A", "first"), output("B", "last")]));

        assert_eq!(build_role_arn(&api, "DevopsStack02").await.unwrap(), "last");
    }

    #[tokio::test]
    async fn no_outputs_is_an_error() {
        let mut api = MockStackApi::new();
        api.expect_describe_stack_outputs().returning(|_| Ok(vec![]));

        let err = build_role_arn(&api, "DevopsStack02").await.unwrap_err();
        assert!(err.to_string().contains("no outputs"));
    }
}
