use crate::models::{Asset, LocalAsset, RemoteAsset};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Merge local and remote assets into one de-duplicated view.
///
/// Each local asset whose fingerprint matches a remote asset becomes a single
/// [`Asset::Merged`] entry; the first local asset to claim a fingerprint wins
/// and later locals with the same fingerprint stay local-only. Remote assets
/// whose fingerprint was never claimed follow. Local assets without a
/// fingerprint never match anything.
///
/// The result is sorted newest first, see [`sort_assets`].
pub fn merge_assets(local: &[LocalAsset], remote: &[RemoteAsset]) -> Vec<Asset> {
    let mut by_fingerprint: HashMap<&str, &RemoteAsset> = HashMap::with_capacity(remote.len());
    for asset in remote {
        by_fingerprint
            .entry(asset.fingerprint.as_str())
            .or_insert(asset);
    }

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut merged = Vec::with_capacity(local.len() + remote.len());

    for asset in local {
        let matched = asset
            .fingerprint
            .as_deref()
            .filter(|fp| !consumed.contains(fp))
            .and_then(|fp| by_fingerprint.get(fp).copied());

        match matched {
            Some(remote_asset) => {
                consumed.insert(remote_asset.fingerprint.as_str());
                let mut local = asset.clone();
                local.remote_id = Some(remote_asset.id.clone());
                merged.push(Asset::Merged {
                    local,
                    remote_id: remote_asset.id.clone(),
                });
            }
            None => merged.push(Asset::Local(asset.clone())),
        }
    }

    merged.extend(
        remote
            .iter()
            .filter(|asset| !consumed.contains(asset.fingerprint.as_str()))
            .cloned()
            .map(Asset::Remote),
    );

    sort_assets(&mut merged);
    merged
}

/// Sort newest first; equal timestamps are ordered by display identity.
pub fn sort_assets(assets: &mut [Asset]) {
    assets.sort_by(compare_newest_first);
}

fn compare_newest_first(a: &Asset, b: &Asset) -> Ordering {
    b.timestamp()
        .cmp(&a.timestamp())
        .then_with(|| a.display_id().cmp(b.display_id()))
}

/// Sort remote assets newest first, ties by identity.
pub fn sort_remote(assets: &mut [RemoteAsset]) {
    assets.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
}
