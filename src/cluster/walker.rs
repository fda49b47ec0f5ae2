use futures::stream::{self, BoxStream, StreamExt};

use crate::cluster::ControlPlane;
use crate::errors::ListError;
use crate::types::{LiveObject, ResourceKind};

/// Walk the live objects of `kinds` in one namespace, or in every namespace
/// when `namespace` is `None` or empty.
///
/// The namespace listing is taken once, when this function is called. List
/// calls are then issued lazily as the stream is consumed, one per
/// (kind, namespace) pair, kind-major. Kinds without the `list` verb are
/// skipped. A failed list call is logged and its pair skipped.
///
/// # Errors
/// Only the initial namespace listing can fail.
pub async fn walk<'a>(
    control_plane: &'a dyn ControlPlane,
    namespace: Option<&str>,
    kinds: &'a [ResourceKind],
) -> Result<BoxStream<'a, LiveObject>, ListError> {
    let namespaces: Vec<String> = match namespace.filter(|ns| !ns.is_empty()) {
        Some(ns) => vec![ns.to_string()],
        None => control_plane
            .list_namespaces()
            .await
            .map_err(|source| ListError::new("namespaces", "", source))?
            .into_iter()
            .map(|ns| ns.name)
            .collect(),
    };

    let pairs: Vec<(&'a ResourceKind, String)> = kinds
        .iter()
        .filter(|kind| {
            if !kind.can_list() {
                tracing::debug!("Skipping {}, list is not supported", kind);
            }
            kind.can_list()
        })
        .flat_map(|kind| namespaces.iter().map(move |ns| (kind, ns.clone())))
        .collect();

    let objects = stream::iter(pairs)
        .then(move |(kind, ns)| async move {
            match control_plane.list_objects(kind, &ns).await {
                Ok(items) => items
                    .into_iter()
                    .map(|obj| LiveObject::new(kind.clone(), obj))
                    .collect::<Vec<_>>(),
                Err(source) => {
                    let why = ListError::new(kind.to_string(), ns, source);
                    tracing::warn!("{}: {}", why, why.source);
                    Vec::new()
                }
            }
        })
        .flat_map(stream::iter)
        .boxed();

    Ok(objects)
}
