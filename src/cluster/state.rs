use std::collections::BTreeMap;

use anyhow::{bail, ensure};

use crate::config::CliArgs;

/// Static membership of the replica group plus where to reach each member.
///
/// The peer map includes this node itself; its key set is the membership
/// that every vector clock in the system ranges over.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub node_id: String,
    pub listen_addr: String,
    pub peers: BTreeMap<String, String>,
}

impl ClusterState {
    pub fn members(&self) -> impl Iterator<Item = &str> + '_ {
        self.peers.keys().map(String::as_str)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.peers.contains_key(node_id)
    }

    /// Base URLs of every member except this node.
    pub fn peer_urls(&self) -> Vec<(String, String)> {
        self.peers
            .iter()
            .filter(|(id, _)| **id != self.node_id)
            .map(|(id, url)| (id.clone(), url.clone()))
            .collect()
    }
}

impl TryFrom<CliArgs> for ClusterState {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let mut peers = BTreeMap::new();
        for pair in &args.peers {
            let (id, url) = match pair.split_once('=') {
                Some(parts) => parts,
                None => bail!("malformed peer entry '{pair}', expected id=base_url"),
            };
            ensure!(
                !id.is_empty() && !url.is_empty(),
                "malformed peer entry '{pair}', expected id=base_url"
            );
            if peers
                .insert(id.to_string(), url.trim_end_matches('/').to_string())
                .is_some()
            {
                bail!("duplicate peer id '{id}'");
            }
        }
        ensure!(!peers.is_empty(), "peer map must not be empty");
        ensure!(
            peers.contains_key(&args.node_id),
            "node id '{}' is not a member of the peer map",
            args.node_id
        );

        Ok(ClusterState {
            node_id: args.node_id,
            listen_addr: args.listen_addr,
            peers,
        })
    }
}
