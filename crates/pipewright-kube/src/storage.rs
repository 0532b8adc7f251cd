//! StorageClass apply and delete

use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, ResourceExt};
use serde::Deserialize;
use tracing::info;

use pipewright_common::{Error, Result};

const STORAGE_CLASS_KIND: &str = "StorageClass";

/// Parse every StorageClass document in a (possibly multi-document) manifest.
/// Documents of any other kind are rejected.
pub fn parse_storage_classes(manifest: &str) -> Result<Vec<StorageClass>> {
    let mut classes = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifest) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::internal("storage class", format!("invalid YAML: {}", e)))?;
        if value.is_null() {
            continue;
        }
        let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("");
        if kind != STORAGE_CLASS_KIND {
            return Err(Error::internal(
                "storage class",
                format!("expected kind {}, found '{}'", STORAGE_CLASS_KIND, kind),
            ));
        }
        let class: StorageClass = serde_yaml::from_value(value)
            .map_err(|e| Error::internal("storage class", format!("invalid StorageClass: {}", e)))?;
        classes.push(class);
    }
    if classes.is_empty() {
        return Err(Error::internal("storage class", "manifest contains no documents"));
    }
    Ok(classes)
}

/// Create the StorageClasses in `manifest`. Classes that already exist are
/// left alone.
pub async fn apply_storage_classes(client: &Client, manifest: &str) -> Result<usize> {
    let api: Api<StorageClass> = Api::all(client.clone());
    let classes = parse_storage_classes(manifest)?;

    for class in &classes {
        let name = class.name_any();
        match api.create(&PostParams::default(), class).await {
            Ok(_) => info!(storage_class = %name, "StorageClass created"),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                info!(storage_class = %name, "StorageClass already exists")
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(classes.len())
}

/// Delete the StorageClass called `name`. A missing class is not an error.
pub async fn delete_storage_class(client: &Client, name: &str) -> Result<()> {
    let api: Api<StorageClass> = Api::all(client.clone());
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => info!(storage_class = %name, "StorageClass deleted"),
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            info!(storage_class = %name, "StorageClass already absent")
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
