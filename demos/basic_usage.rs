//! Typed and dynamic clientset operations with a watch running alongside

use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use kube_fake_clientset::{ClientsetBuilder, Patch, Scheme, Unstructured, GVR};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let scheme = Scheme::new();
    scheme.register::<Deployment>();

    let mut seeded = Deployment::default();
    seeded.metadata.name = Some("web-server".to_string());
    seeded.metadata.namespace = Some("ns-1".to_string());

    let clientset = ClientsetBuilder::new()
        .with_scheme(Arc::new(scheme))
        .with_object(seeded)
        .with_watch_capacity(16)
        .build()?;

    let deployments = clientset.api::<Deployment>("ns-1");
    let watch = deployments.watch("dp=1")?;
    let printer = tokio::spawn(async move {
        watch
            .into_stream()
            .take(3)
            .for_each(|item| async move {
                match item {
                    Ok(event) => println!(
                        "watch: {:?} {}",
                        event.event_type,
                        event.object.metadata.name.unwrap_or_default()
                    ),
                    Err(e) => println!("watch error: {}", e),
                }
            })
            .await;
    });

    let mut dp = Deployment::default();
    dp.metadata.name = Some("my-dp".to_string());
    dp.metadata.labels = Some(BTreeMap::from([("dp".to_string(), "1".to_string())]));
    dp.spec = Some(DeploymentSpec {
        replicas: Some(2),
        ..Default::default()
    });

    let created = deployments.create(&dp)?;
    println!(
        "created my-dp at resourceVersion {}",
        created.metadata.resource_version.as_deref().unwrap_or_default()
    );

    let patched = deployments.patch("my-dp", &Patch::Merge(json!({"spec": {"replicas": 1}})))?;
    println!(
        "patched replicas to {}",
        patched.spec.and_then(|s| s.replicas).unwrap_or_default()
    );

    for dp in deployments.list("")? {
        println!("  - {}", dp.metadata.name.unwrap_or_default());
    }

    deployments.delete("my-dp")?;
    printer.await?;

    let apps = clientset
        .dynamic()
        .resource(GVR::new("core.oam.dev", "v1beta1", "applications"))
        .namespace("ns-1");
    let mut app = Unstructured::new("core.oam.dev/v1beta1", "Application");
    app.set_name("my-app");
    app.set_nested_field(
        &["spec", "components"],
        json!([{"name": "web", "type": "webservice", "properties": {"image": "nginx"}}]),
    )?;
    let app = apps.create(&app)?;
    println!(
        "created application {} at resourceVersion {}",
        app.name().unwrap_or_default(),
        app.resource_version()?.unwrap_or_default()
    );

    Ok(())
}
