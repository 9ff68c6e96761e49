//! Process wiring: builds the local peer manager and registry, spawns
//! the listening socket's accept loop, dials every peer listed before
//! us, runs both choking-scheduler loops, and waits for termination.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::config::Config;
use crate::error::Error;
use crate::event_log::EventLog;
use crate::local_peer::LocalPeerManager;
use crate::piece::PieceLayout;
use crate::registry::Registry;
use crate::{connection, scheduler, PeerId, Result};

pub struct Engine {
    local_id: PeerId,
    config: Config,
    local_peer: Arc<LocalPeerManager>,
    registry: Arc<Registry>,
    event_log: Arc<EventLog>,
    terminated: Arc<Notify>,
}

impl Engine {
    pub fn new(local_id: PeerId, config: Config) -> Result<Self> {
        let entry = config
            .local_entry(local_id)
            .ok_or(Error::UnknownPeer { peer_id: local_id })?;

        let layout = PieceLayout::new(config.common.file_size, config.common.piece_size);
        let content = if entry.has_file {
            Some(std::fs::read(&config.common.file_name).map_err(Error::Io)?)
        } else {
            None
        };

        let local_peer = Arc::new(LocalPeerManager::new(local_id, layout, entry.has_file, content));
        let registry = Arc::new(Registry::new());
        let event_log = Arc::new(EventLog::open(local_id)?);

        Ok(Self {
            local_id,
            config,
            local_peer,
            registry,
            event_log,
            terminated: Arc::new(Notify::new()),
        })
    }

    /// Joins the swarm and blocks until termination: accepts inbound
    /// connections, dials every peer listed before us, runs the choking
    /// scheduler, and persists the file once every piece is held
    /// everywhere.
    pub async fn run(self) -> Result<()> {
        let entry = self
            .config
            .local_entry(self.local_id)
            .expect("validated in Engine::new")
            .clone();

        let listener = TcpListener::bind(("0.0.0.0", entry.port)).await?;
        tokio::spawn(self.accept_loop(listener));

        for peer in self.config.peers_to_dial(self.local_id) {
            tokio::spawn(self.dial(peer.peer_id, peer.addr()));
        }

        tokio::spawn(scheduler::run_preferred_neighbor_loop(
            self.local_id,
            self.config.common.number_of_preferred_neighbors,
            self.config.common.unchoking_interval,
            self.local_peer.clone(),
            self.registry.clone(),
            self.event_log.clone(),
        ));
        tokio::spawn(scheduler::run_optimistic_unchoke_loop(
            self.local_id,
            self.config.common.optimistic_unchoking_interval,
            self.registry.clone(),
            self.event_log.clone(),
        ));

        tokio::spawn(self.termination_watch());

        self.terminated.notified().await;

        let content = self.local_peer.assemble_file().await;
        crate::disk::persist(".", self.local_id, &self.config.common.file_name, &content).await?;

        Ok(())
    }

    fn accept_loop(&self, listener: TcpListener) -> impl std::future::Future<Output = ()> {
        let local_id = self.local_id;
        let local_peer = self.local_peer.clone();
        let registry = self.registry.clone();
        let event_log = self.event_log.clone();
        async move {
            loop {
                match listener.accept().await {
                    Ok((socket, _addr)) => {
                        let local_peer = local_peer.clone();
                        let registry = registry.clone();
                        let event_log = event_log.clone();
                        tokio::spawn(async move {
                            if let Err(e) = connection::spawn(
                                local_id, None, socket, false, local_peer, registry, event_log,
                            )
                            .await
                            {
                                log::warn!("peer {}: inbound connection ended: {}", local_id, e);
                            }
                        });
                    }
                    Err(e) => {
                        log::warn!("peer {}: accept error: {}", local_id, e);
                    }
                }
            }
        }
    }

    fn dial(&self, remote_id: PeerId, addr: String) -> impl std::future::Future<Output = ()> {
        let local_id = self.local_id;
        let local_peer = self.local_peer.clone();
        let registry = self.registry.clone();
        let event_log = self.event_log.clone();
        async move {
            match tokio::net::TcpStream::connect(&addr).await {
                Ok(socket) => {
                    if let Err(e) = connection::spawn(
                        local_id,
                        Some(remote_id),
                        socket,
                        true,
                        local_peer,
                        registry,
                        event_log,
                    )
                    .await
                    {
                        log::warn!("peer {}: connection to peer {} ended: {}", local_id, remote_id, e);
                    }
                }
                Err(e) => {
                    log::warn!("peer {}: failed to dial peer {} at {}: {}", local_id, remote_id, addr, e);
                }
            }
        }
    }

    fn termination_watch(&self) -> impl std::future::Future<Output = ()> {
        let local_peer = self.local_peer.clone();
        let registry = self.registry.clone();
        let terminated = self.terminated.clone();
        async move {
            let mut poll = tokio::time::interval(tokio::time::Duration::from_millis(200));
            loop {
                poll.tick().await;
                if local_peer.attempt_terminate(&registry).await {
                    terminated.notify_one();
                    break;
                }
            }
        }
    }
}
