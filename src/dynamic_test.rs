#[cfg(test)]
mod tests {
    use crate::dynamic::*;
    use crate::scheme::Scheme;
    use crate::tracker::{Patch, GVR};
    use crate::unstructured::Unstructured;
    use crate::watch::EventType;
    use crate::Error;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::Namespace;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn deployments_gvr() -> GVR {
        GVR::new("apps", "v1", "deployments")
    }

    fn applications_gvr() -> GVR {
        GVR::new("core.oam.dev", "v1beta1", "applications")
    }

    fn deployment(name: &str, replicas: i64) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": name},
            "spec": {"replicas": replicas}
        }))
        .unwrap()
    }

    fn application(name: &str, labels: serde_json::Value) -> Unstructured {
        Unstructured::from_value(json!({
            "apiVersion": "core.oam.dev/v1beta1",
            "kind": "Application",
            "metadata": {"name": name, "labels": labels},
            "spec": {
                "components": [{
                    "name": "my-comp",
                    "type": "webservice",
                    "properties": {"image": "nginx"},
                    "traits": [{"type": "scaler", "properties": {"replicas": 1}}]
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_deployment_lifecycle() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let deployments = client.resource(deployments_gvr()).namespace("ns-1");

        let created = deployments.create(&deployment("my-dp", 2)).unwrap();
        assert_eq!(created.namespace(), Some("ns-1"));
        assert_eq!(created.resource_version().unwrap(), Some(1));

        let mut changed = created.clone();
        changed.set_nested_field(&["spec", "replicas"], json!(1)).unwrap();
        let updated = deployments.update(&changed).unwrap();
        assert_eq!(updated.resource_version().unwrap(), Some(2));

        let fetched = deployments.get("my-dp").unwrap();
        assert_eq!(fetched.nested_i64(&["spec", "replicas"]), Some(1));

        deployments.delete("my-dp").unwrap();
        assert!(deployments.get("my-dp").unwrap_err().is_not_found());
    }

    #[test]
    fn test_application_lifecycle() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let apps = client.resource(applications_gvr()).namespace("ns-1");

        let created = apps.create(&application("my-app", json!({}))).unwrap();
        assert_eq!(
            created.nested_field(&["spec", "components"]).unwrap()[0]["traits"][0]["properties"],
            json!({"replicas": 1})
        );

        let mut changed = created.clone();
        changed
            .set_nested_field(
                &["spec", "components"],
                json!([{
                    "name": "my-comp",
                    "type": "webservice",
                    "traits": [{"type": "scaler", "properties": {"replicas": 3}}]
                }]),
            )
            .unwrap();
        apps.update(&changed).unwrap();

        let fetched = apps.get("my-app").unwrap();
        assert_eq!(
            fetched.nested_field(&["spec", "components"]).unwrap()[0]["traits"][0]["properties"]["replicas"],
            json!(3)
        );

        apps.delete("my-app").unwrap();
        assert!(apps.get("my-app").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_application_watch_with_label_selector() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let apps = client.resource(applications_gvr()).namespace("ns-1");
        let mut watch = apps.watch("app=1").unwrap();

        apps.create(&application("other", json!({"app": "2"}))).unwrap();
        apps.create(&application("my-app", json!({"app": "1"}))).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watch.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(event.event_type, EventType::Added);
        assert_eq!(event.object.name(), Some("my-app"));
        assert!(watch.try_recv().is_none());
    }

    #[test]
    fn test_list_across_namespaces() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let resource = client.resource(deployments_gvr());
        resource.namespace("ns-1").create(&deployment("a", 1)).unwrap();
        resource.namespace("ns-2").create(&deployment("b", 1)).unwrap();

        assert_eq!(resource.list("").unwrap().len(), 2);
        assert_eq!(resource.namespace("ns-2").list("").unwrap().len(), 1);
    }

    #[test]
    fn test_object_namespace_used_without_resource_namespace() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let mut dp = deployment("my-dp", 1);
        dp.set_namespace("ns-3");

        client.resource(deployments_gvr()).create(&dp).unwrap();
        assert!(client
            .resource(deployments_gvr())
            .namespace("ns-3")
            .get("my-dp")
            .is_ok());
    }

    #[test]
    fn test_object_without_namespace_lands_in_default() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let created = client
            .resource(deployments_gvr())
            .create(&deployment("my-dp", 1))
            .unwrap();
        assert_eq!(created.namespace(), Some("default"));
        assert!(client
            .resource(deployments_gvr())
            .namespace("default")
            .get("my-dp")
            .is_ok());
    }

    #[test]
    fn test_mismatched_kind_is_rejected() {
        let scheme = Scheme::new();
        scheme.register::<Deployment>();
        let client = DynamicClient::new(Arc::new(scheme));
        let deployments = client.resource(deployments_gvr()).namespace("ns-1");

        let mut wrong_kind = deployment("my-dp", 1);
        wrong_kind.set_kind("StatefulSet");
        assert!(matches!(
            deployments.create(&wrong_kind),
            Err(Error::InvalidRequest(_))
        ));

        let wrong_group = application("my-app", json!({}));
        assert!(matches!(
            deployments.create(&wrong_group),
            Err(Error::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_patch_unregistered_resource() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let apps = client.resource(applications_gvr()).namespace("ns-1");
        apps.create(&application("my-app", json!({}))).unwrap();

        let patched = apps
            .patch(
                "my-app",
                &Patch::Merge(json!({"metadata": {"labels": {"app": "1"}}})),
            )
            .unwrap();
        assert_eq!(patched.kind(), Some("Application"));
        assert_eq!(patched.labels().get("app").map(String::as_str), Some("1"));
        assert_eq!(patched.resource_version().unwrap(), Some(2));
    }

    #[test]
    fn test_cluster_scoped_kind_round_trips_through_namespaced_handle() {
        let scheme = Scheme::new();
        scheme.register::<Namespace>();
        let client = DynamicClient::new(Arc::new(scheme));
        let namespaces = client
            .resource(GVR::new("", "v1", "namespaces"))
            .namespace("x");

        let mut ns = Unstructured::new("v1", "Namespace");
        ns.set_name("ns-1");
        let created = namespaces.create(&ns).unwrap();
        assert_eq!(created.namespace(), None);

        assert_eq!(namespaces.get("ns-1").unwrap().name(), Some("ns-1"));
        assert_eq!(namespaces.list("").unwrap().len(), 1);
        assert_eq!(client.resource(GVR::new("", "v1", "namespaces")).list("").unwrap().len(), 1);

        let patched = namespaces
            .patch("ns-1", &Patch::Merge(json!({"metadata": {"labels": {"team": "a"}}})))
            .unwrap();
        assert_eq!(patched.resource_version().unwrap(), Some(2));

        let mut watch = namespaces.watch("").unwrap();
        namespaces.delete("ns-1").unwrap();
        assert_eq!(watch.try_recv().unwrap().unwrap().event_type, EventType::Deleted);
        assert!(namespaces.get("ns-1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_malformed_selector_is_rejected() {
        let client = DynamicClient::new(Arc::new(Scheme::new()));
        let apps = client.resource(applications_gvr()).namespace("ns-1");

        assert!(matches!(apps.watch("app in (1"), Err(Error::InvalidSelector(_))));
        assert!(matches!(apps.list("app in (1"), Err(Error::InvalidSelector(_))));
    }
}
