use crate::cluster::ControlPlane;
use crate::errors::DiscoveryError;
use crate::types::ResourceKind;

/// List every namespaced resource kind that supports `list`.
///
/// Discovery runs per API group; a group that fails (e.g. an unavailable
/// aggregated API) is logged and skipped. Only a failure to enumerate the
/// groups themselves, or a failure of every group, is an error.
///
/// The result reflects the extensions installed right now and must not be
/// reused across commands.
pub async fn list_namespaced_kinds(
    control_plane: &dyn ControlPlane,
) -> Result<Vec<ResourceKind>, DiscoveryError> {
    let groups = control_plane
        .list_groups()
        .await
        .map_err(DiscoveryError::Unreachable)?;

    let mut kinds = Vec::new();
    let mut last_failure = None;
    let mut succeeded = 0;

    for group in &groups {
        match control_plane.list_group_kinds(group).await {
            Ok(group_kinds) => {
                succeeded += 1;
                kinds.extend(
                    group_kinds
                        .into_iter()
                        .filter(|kind| kind.namespaced && kind.can_list()),
                );
            }
            Err(why) => {
                tracing::warn!("Skipping API group {:?}, discovery failed: {}", group, why);
                last_failure = Some(why);
            }
        }
    }

    if succeeded == 0 {
        if let Some(last) = last_failure {
            return Err(DiscoveryError::AllGroupsFailed {
                groups: groups.len(),
                last,
            });
        }
    }

    tracing::debug!("Discovered {} listable namespaced resources", kinds.len());
    Ok(kinds)
}
