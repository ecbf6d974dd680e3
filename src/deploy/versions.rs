//! Version publishing and pruning

use futures::future::join_all;
use tracing::{error, info, warn};

use super::Deployer;
use crate::error::Result;

/// What a publish-and-prune pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub published: String,
    pub retained: String,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Split listed versions into the one to keep and the numbered ones to delete
///
/// The newest version is the numeric maximum of the listed versions and the
/// one just published, independent of list order. `$LATEST` and other
/// non-numeric qualifiers are never returned for deletion.
pub fn select_stale_versions(versions: &[String], published: &str) -> (String, Vec<String>) {
    let newest = versions
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(published))
        .filter_map(|v| v.parse::<u64>().ok())
        .max();

    let Some(newest) = newest else {
        return (published.to_string(), Vec::new());
    };

    let mut stale: Vec<(u64, String)> = versions
        .iter()
        .filter_map(|v| v.parse::<u64>().ok().map(|n| (n, v.clone())))
        .filter(|(n, _)| *n != newest)
        .collect();
    stale.sort_by_key(|(n, _)| *n);
    stale.dedup_by_key(|(n, _)| *n);

    (
        newest.to_string(),
        stale.into_iter().map(|(_, v)| v).collect(),
    )
}

impl Deployer {
    /// Publish `$LATEST` and delete every older numbered version
    ///
    /// Deletions run concurrently. A failed deletion is logged and listed in
    /// the report; it does not fail the deployment.
    pub async fn publish_and_prune(&self, function_name: &str) -> Result<PruneReport> {
        let functions = &self.clients.functions;

        let published = self
            .call("publish_version", || functions.publish_version(function_name))
            .await
            .inspect_err(|err| error!("Unable to publish version. [Error: {}]", err))?;
        info!(
            "Published version. [FunctionName: {}] [Version: {}]",
            function_name, published
        );

        let versions = self
            .call("list_versions", || functions.list_versions(function_name))
            .await
            .inspect_err(|err| error!("Unable to list versions. [Error: {}]", err))?;

        let (retained, stale) = select_stale_versions(&versions, &published);
        if stale.is_empty() {
            info!("No versions to prune. [Retained: {}]", retained);
        }

        let results = join_all(stale.iter().map(|qualifier| async move {
            let result = self
                .call("delete_function_version", || {
                    functions.delete_function_version(function_name, qualifier)
                })
                .await;
            (qualifier.clone(), result)
        }))
        .await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (qualifier, result) in results {
            match result {
                Ok(()) => {
                    info!(
                        "Deleted version. [FunctionName: {}] [Version: {}]",
                        function_name, qualifier
                    );
                    deleted.push(qualifier);
                }
                Err(err) => {
                    warn!(
                        "Unable to delete version. [FunctionName: {}] [Version: {}] [Error: {}]",
                        function_name, qualifier, err
                    );
                    failed.push(qualifier);
                }
            }
        }

        Ok(PruneReport {
            published,
            retained,
            deleted,
            failed,
        })
    }
}
