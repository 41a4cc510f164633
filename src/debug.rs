//! Debug protocol handler backed by a support worker

use keystone_debug::{
    ChainInfo, DebugCommand, DebugHandler, DebugReply, DebugResponse, ResponseData, StatsInfo,
};

use crate::core::IVec3;
use crate::octree::TreeStats;
use crate::support::SupportClient;

/// Answers debug commands by querying the worker. Queries run on the worker
/// thread after every command queued before them.
pub struct SupportDebugHandler {
    client: SupportClient,
}

impl SupportDebugHandler {
    pub fn new(client: SupportClient) -> Self {
        Self { client }
    }
}

fn stats_info(stats: TreeStats) -> StatsInfo {
    StatsInfo {
        nodes: stats.nodes,
        chains: stats.chains,
        subchain_bins: stats.subchain_bins,
        touching_bins: stats.touching_bins,
        root_position: stats.root_position,
        root_size: stats.root_size,
        root_chains: stats.root_chains,
    }
}

impl DebugHandler for SupportDebugHandler {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugReply {
        match cmd {
            DebugCommand::Ping => DebugResponse::pong().into(),

            DebugCommand::Status => DebugResponse::ok(ResponseData::Status {
                running: self.client.is_running(),
                pending_updates: self.client.pending_updates(),
            })
            .into(),

            DebugCommand::Validate => {
                let client = self.client.clone();
                DebugReply::deferred(async move {
                    match client.validate().await {
                        Ok(()) => DebugResponse::ok(ResponseData::Validation {
                            valid: true,
                            message: None,
                        }),
                        Err(crate::core::Error::Invariant(message)) => {
                            DebugResponse::ok(ResponseData::Validation {
                                valid: false,
                                message: Some(message),
                            })
                        }
                        Err(e) => DebugResponse::error(e.to_string()),
                    }
                })
            }

            DebugCommand::Stats => {
                let client = self.client.clone();
                DebugReply::deferred(async move {
                    match client.stats().await {
                        Ok(stats) => DebugResponse::ok(ResponseData::Stats(stats_info(stats))),
                        Err(e) => DebugResponse::error(e.to_string()),
                    }
                })
            }

            DebugCommand::ChainAt { x, y, z } => {
                let client = self.client.clone();
                DebugReply::deferred(async move {
                    match client.chain_at(IVec3::new(x, y, z)).await {
                        Ok(Some(report)) => DebugResponse::ok(ResponseData::Chain(ChainInfo {
                            found: true,
                            supported: Some(report.supported),
                            touching_boundary: Some(report.touching_boundary),
                            detached: Some(report.detached),
                            size: Some(report.size),
                        })),
                        Ok(None) => DebugResponse::ok(ResponseData::Chain(ChainInfo::not_found())),
                        Err(e) => DebugResponse::error(e.to_string()),
                    }
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SupportConfig;
    use crate::octree::SolidityGrid;
    use crate::support::SupportHandle;

    fn resolve(reply: DebugReply) -> DebugResponse {
        match reply {
            DebugReply::Ready(response) => response,
            DebugReply::Deferred(future) => tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap()
                .block_on(future),
        }
    }

    #[test]
    fn test_commands_against_worker() {
        let handle = SupportHandle::spawn(SupportConfig::with_chunk_size(4)).unwrap();
        handle
            .load_chunk(SolidityGrid::from_fn(4, |p| p.y == 0), IVec3::ZERO)
            .unwrap();
        let mut handler = SupportDebugHandler::new(handle.client().clone());

        assert_eq!(resolve(handler.handle_command(DebugCommand::Ping)), DebugResponse::pong());
        assert_eq!(
            resolve(handler.handle_command(DebugCommand::Validate)),
            DebugResponse::ok(ResponseData::Validation {
                valid: true,
                message: None
            })
        );
        match resolve(handler.handle_command(DebugCommand::Stats)) {
            DebugResponse::Ok {
                data: ResponseData::Stats(stats),
            } => assert_eq!(stats.root_size, Some(4)),
            other => panic!("unexpected {:?}", other),
        }
        match resolve(handler.handle_command(DebugCommand::ChainAt { x: 0, y: 0, z: 0 })) {
            DebugResponse::Ok {
                data: ResponseData::Chain(info),
            } => {
                assert!(info.found);
                assert_eq!(info.supported, Some(false));
            }
            other => panic!("unexpected {:?}", other),
        }
        match resolve(handler.handle_command(DebugCommand::Status)) {
            DebugResponse::Ok {
                data: ResponseData::Status { running, .. },
            } => assert!(running),
            other => panic!("unexpected {:?}", other),
        }
    }
}
