//! ---
//! rig_section: "12-suites"
//! rig_subsection: "module"
//! rig_type: "source"
//! rig_scope: "code"
//! rig_description: "Bundle creation and deployment script."
//! rig_version: "v0.1.0"
//! rig_owner: "tbd"
//! ---
use rig_client::model::{props, status};
use rig_client::{ClientError, Configuration, Entity, ManagerProxy, Mutation};
use rig_logging::rig_info;
use rig_testharness::{
    assert_equals, assert_not_null, assert_number_equals, assert_true, AssertionFailure,
    HarnessError, HarnessResult, TestContext, TestFuture, TestScript,
};

pub const SCRIPT: &str = "bundles";

const BUNDLE_NAME: &str = "testScriptBundle";
const BUNDLE_TYPE: &str = "File Template Bundle";
const ARCHIVE: &str = "testBundle.war";
const RECIPE: &str = "file -s testBundle.war -d <%bundleTest.deployHome%>/testBundle.war";
const DEPLOY_HOME: &str = "bundleTest.deployHome";

pub fn script() -> TestScript {
    TestScript::new(SCRIPT)
        .with_description("Creates a file template bundle and deploys it to a Windows platform")
        .with_test("deploy_bundle", deploy_bundle)
        .with_test("duplicate_bundle_is_rejected", duplicate_bundle_is_rejected)
        .with_test(
            "deploy_definition_requires_recipe_properties",
            deploy_definition_requires_recipe_properties,
        )
}

/// Remove any bundle left by an earlier run, then create a fresh one.
async fn fresh_bundle(ctx: &TestContext, name: &str) -> HarnessResult<Entity> {
    let bundles = ctx.bundles();
    bundles.delete_bundle_by_name(name).await?;
    let bundle_type = bundles.get_bundle_type_by_name(BUNDLE_TYPE).await?;
    let bundle_type = assert_not_null(
        bundle_type,
        format!("Failed to find bundle type '{BUNDLE_TYPE}'"),
    )?;
    Ok(bundles.create_bundle(name, bundle_type.id, None).await?)
}

async fn windows_platform(ctx: &TestContext) -> HarnessResult<Entity> {
    let resources = ctx.resources();
    let mut criteria = resources.criteria();
    criteria.filter_resource_type_name("win")?;
    let platform = resources
        .find_resources_by_criteria(criteria.build())
        .await?
        .into_iter()
        .find(|resource| resource.parent_id.is_none());
    Ok(assert_not_null(platform, "Failed to find a Windows platform")?)
}

fn deploy_bundle(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let bundle = fresh_bundle(ctx, BUNDLE_NAME).await?;
        let bundles = ctx.bundles();

        let version = bundles
            .create_bundle_version(bundle.id, BUNDLE_NAME, None, RECIPE)
            .await?;
        let file = bundles
            .add_bundle_file_via_bytes(version.id, ARCHIVE, "1.0", b"PK\x03\x04testBundle")
            .await?;
        assert_equals(file.file_name.as_str(), ARCHIVE, "stored file name")?;

        let config = Configuration::new().with(DEPLOY_HOME, "C:/temp");
        let definition = bundles
            .create_deploy_definition(
                version.id,
                "Windows Deployment",
                Some("Windows Deployment of testBundle WAR"),
                config,
            )
            .await?;

        let platform = windows_platform(ctx).await?;
        let pending = match bundles
            .schedule_bundle_deployment(definition.id, platform.id)
            .await?
        {
            Mutation::Pending(pending) => pending,
            Mutation::Applied(_) => {
                return Err(AssertionFailure::new("expected a pending deployment").into())
            }
        };
        let completion = ctx.await_completion(&bundles, &pending).await?;
        assert_true(
            completion.is_success(),
            format!(
                "deployment to {} failed: {}",
                platform.name,
                completion.failure_message().unwrap_or("no reason given")
            ),
        )?;
        let deployment = &completion.settled;
        let entity = deployment.reference();
        rig_info!(
            context = ctx.log_context().with_entity(&entity),
            "bundle deployed to {} after {} polls",
            platform.name,
            completion.polls
        );

        let mut criteria = bundles.criteria_for(deployment.kind)?;
        criteria
            .filter_deploy_definition_id(definition.id)?
            .filter_resource_id(platform.id)?
            .filter_status(status::SUCCESS)?
            .set_strict(true);
        let found = bundles
            .find_bundle_deployments_by_criteria(criteria.build())
            .await?;
        assert_number_equals(found.len(), 1, "completed deployments of the definition")?;
        assert_equals(
            found[0].property(props::STATUS),
            Some(status::SUCCESS),
            "deployment status",
        )?;

        bundles.delete_bundle(bundle.id).await?;
        Ok(())
    })
}

fn duplicate_bundle_is_rejected(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let name = format!("{BUNDLE_NAME}-duplicate");
        let bundle = fresh_bundle(ctx, &name).await?;
        let bundles = ctx.bundles();
        let type_id = assert_not_null(
            bundles.get_bundle_type_by_name(BUNDLE_TYPE).await?,
            "bundle type disappeared",
        )?
        .id;

        match bundles.create_bundle(&name, type_id, None).await {
            Err(ClientError::Conflict(_)) => {}
            Err(other) => return Err(HarnessError::Client(other)),
            Ok(created) => {
                return Err(AssertionFailure::new(format!(
                    "second bundle named '{name}' was accepted as {}",
                    created.reference()
                ))
                .into())
            }
        }

        let mut criteria = bundles.criteria();
        criteria
            .filter_name(&name)?
            .set_strict(true)
            .set_case_sensitive(true);
        let found = bundles.find_bundles_by_criteria(criteria.build()).await?;
        assert_number_equals(found.len(), 1, "bundles sharing a name")?;

        bundles.delete_bundle(bundle.id).await?;
        Ok(())
    })
}

fn deploy_definition_requires_recipe_properties(ctx: &mut TestContext) -> TestFuture<'_> {
    Box::pin(async move {
        let name = format!("{BUNDLE_NAME}-incomplete");
        let bundle = fresh_bundle(ctx, &name).await?;
        let bundles = ctx.bundles();
        let version = bundles
            .create_bundle_version(bundle.id, &name, Some("1.0"), RECIPE)
            .await?;

        let result = bundles
            .create_deploy_definition(version.id, "Incomplete Deployment", None, Configuration::new())
            .await;
        let message = match result {
            Err(ClientError::Validation(message)) => message,
            Err(other) => return Err(HarnessError::Client(other)),
            Ok(created) => {
                return Err(AssertionFailure::new(format!(
                    "definition without {DEPLOY_HOME} was accepted as {}",
                    created.reference()
                ))
                .into())
            }
        };
        assert_true(
            message.contains(DEPLOY_HOME),
            format!("validation message names the missing property: {message}"),
        )?;

        bundles.delete_bundle(bundle.id).await?;
        Ok(())
    })
}
