use crate::tracker::{GVK, GVR};

/// Pluralize a Kubernetes Kind name to its resource plural form.
///
/// Implementation copied from kube-rs to ensure consistency with the broader ecosystem.
/// See: <https://github.com/kube-rs/kube/blob/main/kube-core/src/discovery.rs>
///
/// Copyright (c) kube-rs contributors
/// Licensed under Apache-2.0
pub fn pluralize(kind: &str) -> String {
    let word = kind.to_ascii_lowercase();

    if word == "endpoints" || word == "endpointslices" {
        return word;
    } else if word == "nodemetrics" {
        return "nodes".to_string();
    } else if word == "podmetrics" {
        return "pods".to_string();
    }

    if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        return format!("{word}es");
    }

    if word.ends_with('y') {
        if let Some(c) = word.chars().nth(word.len() - 2) {
            if !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u') {
                let mut chars = word.chars();
                chars.next_back();
                return format!("{}ies", chars.as_str());
            }
        }
    }

    format!("{word}s")
}

/// Split an `apiVersion` string into group and version. The core group is `""`.
pub fn split_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

pub fn join_api_version(group: &str, version: &str) -> String {
    if group.is_empty() {
        version.to_string()
    } else {
        format!("{}/{}", group, version)
    }
}

/// Guess the resource for a kind the scheme does not know about.
pub fn guess_resource(gvk: &GVK) -> GVR {
    GVR::new(gvk.group.clone(), gvk.version.clone(), pluralize(&gvk.kind))
}
