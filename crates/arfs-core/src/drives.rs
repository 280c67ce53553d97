//! Drive header lookup and per-wallet drive listing.

use crate::builder::{EntityBuilder, EntityError};
use crate::crypto::DriveKey;
use crate::decryptor::PrivateKeyDecryptor;
use crate::entity::SafeDrive;
use crate::ids::EntityId;
use crate::ledger::{self, GqlNode, LedgerClient, LedgerQuery, TagFilter};
use crate::revision::RevisionCollapser;
use crate::tags::{self, DrivePrivacy, EntityType};

use tracing::{debug, warn};

/// Newest revision of `drive_id`, or `None` if the ledger has no usable one.
///
/// With an explicit `key`, private drives are opened with it first; if it does
/// not fit, the decryptor's cascade runs as for any other drive.
pub async fn latest_drive_header<L: LedgerClient + ?Sized>(
    ledger: &L,
    drive_id: &EntityId,
    owner: Option<&str>,
    decryptor: &PrivateKeyDecryptor,
    key: Option<&DriveKey>,
) -> ledger::Result<Option<SafeDrive>> {
    let mut query = LedgerQuery::new(vec![
        TagFilter::new(tags::DRIVE_ID, [drive_id.to_string()]),
        TagFilter::new(tags::ENTITY_TYPE, [EntityType::Drive.as_str()]),
    ]);
    if let Some(owner) = owner {
        query = query.owner(owner);
    }

    let builder = EntityBuilder::new(ledger);
    let mut revisions = RevisionCollapser::new();
    for node in fetch_all(ledger, query).await? {
        let built = match key {
            Some(key) if is_private(&node) => match builder.private_drive(&node, key).await {
                Ok(drive) => Ok(SafeDrive::from(drive)),
                Err(EntityError::DecryptionFailed { .. }) => {
                    debug!("Supplied key does not open drive {}, trying known keys", drive_id);
                    builder.safe_drive(&node, decryptor).await
                }
                Err(e) => Err(e),
            },
            _ => builder.safe_drive(&node, decryptor).await,
        };
        if let Some(drive) = skip_malformed(built)? {
            revisions.push(drive);
        }
    }

    Ok(revisions.get(drive_id).cloned())
}

/// Every drive created by `owner`, latest revision each.
///
/// Private drives no key opens come back with sealed name and root folder.
pub async fn all_drives_for_address<L: LedgerClient + ?Sized>(
    ledger: &L,
    owner: &str,
    decryptor: &PrivateKeyDecryptor,
) -> ledger::Result<Vec<SafeDrive>> {
    let query = LedgerQuery::new(vec![TagFilter::new(tags::ENTITY_TYPE, [EntityType::Drive.as_str()])]).owner(owner);

    let builder = EntityBuilder::new(ledger);
    let mut revisions = RevisionCollapser::new();
    for node in fetch_all(ledger, query).await? {
        if let Some(drive) = skip_malformed(builder.safe_drive(&node, decryptor).await)? {
            revisions.push(drive);
        }
    }

    let drives = revisions.into_vec();
    debug!("Found {} drives for {}", drives.len(), owner);
    Ok(drives)
}

fn is_private(node: &GqlNode) -> bool {
    node.tag(tags::DRIVE_PRIVACY) == Some(DrivePrivacy::Private.as_str())
}

/// Ledger failures propagate; malformed records are logged and dropped.
fn skip_malformed<T>(built: Result<T, EntityError>) -> ledger::Result<Option<T>> {
    match built {
        Ok(entity) => Ok(Some(entity)),
        Err(EntityError::Ledger(e)) => Err(e),
        Err(e) => {
            warn!("Skipping drive record: {}", e);
            Ok(None)
        }
    }
}

async fn fetch_all<L: LedgerClient + ?Sized>(ledger: &L, mut query: LedgerQuery) -> ledger::Result<Vec<GqlNode>> {
    let mut nodes = Vec::new();
    loop {
        let page = ledger.query(&query).await?;
        let next = page.last_cursor().map(String::from);
        nodes.extend(page.edges.into_iter().map(|edge| edge.node));
        if !page.has_next_page || next.is_none() {
            return Ok(nodes);
        }
        query = query.cursor(next);
    }
}
