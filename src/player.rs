//! Play session orchestration
//!
//! `Player` drives one session from start to finish:
//!
//! 1. Resolve the signaling endpoint (once) and the stream name
//! 2. Subscribe to the transport's tracks and connectivity
//! 3. Negotiate
//! 4. Wait for connectivity
//! 5. Hold until the hold time elapses, the session is interrupted or the
//!    connection fails
//! 6. Shut down, exactly once, on every path

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use crate::events::{EventBus, Subscription};
use crate::sink::{build_sink, FrameSink};
use crate::utils::build_http_client;
use crate::webrtc::resolver::looks_like_endpoint;
use crate::webrtc::{
    stream_name, ConnectionMonitor, EndpointResolver, IceConnectivity, MediaTransport,
    MonitorOutcome, PeerConnection, ResolvedEndpoint, Session, SessionNegotiator, SessionReport,
    ShutdownController, TrackRegistry,
};

/// Endpoint and stream a session will use
#[derive(Debug, Clone)]
pub struct PlayTarget {
    pub endpoint: ResolvedEndpoint,
    pub stream: String,
}

pub struct Player {
    config: Arc<SessionConfig>,
    events: Arc<EventBus>,
    session: Arc<Session>,
    resolver: EndpointResolver,
    negotiator: SessionNegotiator,
}

impl Player {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let client = build_http_client(&config)?;
        let events = Arc::new(EventBus::new());
        let session = Arc::new(Session::new(events.clone()));

        Ok(Self {
            resolver: EndpointResolver::new(client.clone(), events.clone()),
            negotiator: SessionNegotiator::new(client, events.clone()),
            config: Arc::new(config),
            events,
            session,
        })
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    /// Work out the endpoint and stream for this session
    ///
    /// Records the endpoint on the session, so it can only be called once.
    pub async fn target(&self) -> Result<PlayTarget> {
        let page_url = self.config.page_url()?;

        let endpoint = match self.config.endpoint_url()? {
            Some(url) => self.resolver.configured(url),
            None if looks_like_endpoint(&page_url) => {
                debug!("{} is already a play endpoint", page_url);
                self.resolver.configured(page_url.clone())
            }
            None => self.resolver.resolve(&page_url, &self.config.page_url).await,
        };
        self.session.set_endpoint(endpoint.url.clone())?;

        let stream = stream_name(&page_url, self.config.stream.as_deref());
        info!(
            "Using API endpoint {} ({}), stream '{}'",
            endpoint.url, endpoint.source, stream
        );
        Ok(PlayTarget { endpoint, stream })
    }

    /// Play over a real WebRTC peer connection
    pub async fn run(&self, cancel: CancellationToken) -> Result<SessionReport> {
        let sink = build_sink(&self.config.sink)?;
        let transport = match PeerConnection::new(&self.config, self.session.id()).await {
            Ok(transport) => transport,
            Err(e) => {
                if let Err(stop_err) = sink.stop() {
                    warn!("Failed to stop {} sink: {}", sink.name(), stop_err);
                }
                return Err(e);
            }
        };
        self.play(Arc::new(transport), sink, cancel).await
    }

    /// Play over any transport
    ///
    /// The transport is closed on every path, including a sink that cannot
    /// be built.
    pub async fn run_with_transport(
        &self,
        transport: Arc<dyn MediaTransport>,
        cancel: CancellationToken,
    ) -> Result<SessionReport> {
        let sink = match build_sink(&self.config.sink) {
            Ok(sink) => sink,
            Err(e) => {
                warn!("Cannot build {} sink: {}", self.config.sink, e);
                if let Err(close_err) = transport.close().await {
                    warn!("Failed to close transport: {}", close_err);
                }
                return Err(e);
            }
        };
        self.play(transport, sink, cancel).await
    }

    async fn play(
        &self,
        transport: Arc<dyn MediaTransport>,
        sink: Arc<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> Result<SessionReport> {
        info!(
            "Starting session {} at {} ({} sink)",
            self.session.id(),
            self.session.started_at().to_rfc3339(),
            self.config.sink
        );

        let registry = Arc::new(TrackRegistry::new(
            self.session.clone(),
            self.events.clone(),
            sink.clone(),
            cancel.clone(),
        ));
        let shutdown = ShutdownController::new(
            self.session.clone(),
            registry.clone(),
            sink,
            transport.clone(),
            self.events.clone(),
            cancel.clone(),
        );

        let connectivity = transport.subscribe_connectivity();
        let mut tracks = transport.subscribe_tracks();
        let pump_registry = registry.clone();
        let pump = tokio::spawn(async move {
            while let Some(source) = tracks.recv().await {
                pump_registry.register(source);
            }
        });

        let outcome = self.drive(transport.as_ref(), connectivity, &cancel).await;
        if let Err(e) = &outcome {
            warn!("Session {} ending: {}", self.session.id(), e);
        }

        let report = shutdown.close().await;
        pump.abort();

        outcome?;
        report.ok_or(AppError::SessionClosed)
    }

    async fn drive(
        &self,
        transport: &dyn MediaTransport,
        connectivity: Subscription<IceConnectivity>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let target = self.target().await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Interrupted during negotiation");
                return Ok(());
            }
            result = self.negotiator.negotiate(
                &self.session,
                transport,
                &target.endpoint.url,
                &target.stream,
            ) => result,
        };
        if let Some(e) = result.error() {
            return Err(e);
        }

        let mut monitor = ConnectionMonitor::new(connectivity, self.events.clone());
        let connect_timeout = self.config.connect_timeout();
        match monitor
            .wait_for_connection(&self.session, connect_timeout, cancel)
            .await
        {
            MonitorOutcome::Connected(_) => {}
            MonitorOutcome::Failed => return Err(AppError::ConnectivityFailed),
            MonitorOutcome::TimedOut => return Err(AppError::ConnectivityTimeout(connect_timeout)),
            MonitorOutcome::Cancelled => return Ok(()),
        }

        self.hold(&mut monitor, cancel).await
    }

    async fn hold(&self, monitor: &mut ConnectionMonitor, cancel: &CancellationToken) -> Result<()> {
        let hold = self.config.hold_timeout();
        match hold {
            Some(duration) => info!("Playing for {}s", duration.as_secs()),
            None => info!("Playing until interrupted"),
        }

        let timer = async {
            match hold {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Interrupted");
                Ok(())
            }
            state = monitor.watch_for_failure(&self.session, cancel) => match state {
                Some(IceConnectivity::Failed) => Err(AppError::ConnectivityFailed),
                Some(state) => {
                    info!("Connection ended ({})", state);
                    Ok(())
                }
                None => Ok(()),
            },
            _ = timer => {
                info!("Hold time elapsed");
                Ok(())
            }
        }
    }
}
