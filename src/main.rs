// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Result};
use axum::{routing::get, Router};
use fleetdns::{
    azure::auth::TokenSource,
    azure::{AzureTrafficManagerClient, TrafficManager},
    constants::{
        DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_RENEW_DEADLINE_SECS,
        DEFAULT_LEASE_RETRY_PERIOD_SECS, ERROR_REQUEUE_DURATION_SECS,
        KIND_TRAFFIC_MANAGER_BACKEND, METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH,
        METRICS_SERVER_PORT, REQUEUE_WHEN_ACCEPTED_SECS, REQUEUE_WHEN_NOT_ACCEPTED_SECS,
        TOKIO_WORKER_THREADS,
    },
    context::{Context, Metrics, Stores},
    crd::{InternalServiceExport, ServiceImport, TrafficManagerBackend, TrafficManagerProfile},
    metrics,
    reconcilers::reconcile_trafficmanagerbackend,
    status_reasons::{CONDITION_ACCEPTED, STATUS_TRUE},
};
use futures::StreamExt;
use kube::{
    runtime::{controller::Action, reflector, reflector::ObjectRef, watcher, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use kube_lease_manager::{LeaseManager, LeaseManagerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
struct ReconcileError(#[from] anyhow::Error);

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name("fleetdns-operator")
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging with custom format
///
/// Respects `RUST_LOG` environment variable if set, otherwise defaults to INFO level.
/// Respects `RUST_LOG_FORMAT` environment variable for output format (json or text).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }

    info!("Starting fleetdns Traffic Manager operator");
}

/// Initialize the Kubernetes client and the Azure Traffic Manager client.
///
/// Azure configuration comes from the environment:
/// - `FLEETDNS_AZURE_SUBSCRIPTION_ID` (required)
/// - `FLEETDNS_AZURE_TENANT_ID` / `FLEETDNS_AZURE_CLIENT_ID` /
///   `FLEETDNS_AZURE_CLIENT_SECRET` for service principal auth, or
///   `FLEETDNS_AZURE_BEARER_TOKEN` for a static token
/// - `FLEETDNS_AZURE_ARM_ENDPOINT` to override the ARM endpoint
async fn initialize_services() -> Result<(Client, Arc<dyn TrafficManager>)> {
    debug!("Initializing Kubernetes client");
    let config = kube::Config::infer().await?;
    let client = Client::try_from(config)?;
    info!("Kubernetes client initialized");

    debug!("Initializing Azure Traffic Manager client");
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let tokens = Arc::new(TokenSource::from_env(http.clone())?);
    let subscription_id = std::env::var("FLEETDNS_AZURE_SUBSCRIPTION_ID")
        .map_err(|_| anyhow!("FLEETDNS_AZURE_SUBSCRIPTION_ID is not set"))?;

    let mut traffic_manager =
        AzureTrafficManagerClient::new(http, subscription_id.clone(), tokens);
    if let Ok(base_url) = std::env::var("FLEETDNS_AZURE_ARM_ENDPOINT") {
        traffic_manager = traffic_manager.with_base_url(base_url);
    }

    info!(subscription = %subscription_id, "Azure Traffic Manager client initialized");
    Ok((client, Arc::new(traffic_manager)))
}

/// Initialize reflectors for all CRD types and create the shared context.
///
/// Each reflector spawns a background task that watches its resource type
/// and updates the corresponding store. The stores are the field-indexer
/// analog: watch mappers resolve cross-resource name references against them
/// without API queries.
#[allow(clippy::unused_async)]
async fn initialize_shared_context(
    client: Client,
    traffic_manager: Arc<dyn TrafficManager>,
) -> Result<Arc<Context>> {
    info!("Initializing reflectors for all CRD types");

    let profiles_api = Api::<TrafficManagerProfile>::all(client.clone());
    let backends_api = Api::<TrafficManagerBackend>::all(client.clone());
    let service_imports_api = Api::<ServiceImport>::all(client.clone());
    let exports_api = Api::<InternalServiceExport>::all(client.clone());

    let (profiles_store, profiles_writer) = reflector::store();
    let (backends_store, backends_writer) = reflector::store();
    let (service_imports_store, service_imports_writer) = reflector::store();
    let (exports_store, exports_writer) = reflector::store();

    tokio::spawn(async move {
        let stream = watcher(profiles_api, watcher::Config::default());
        reflector(profiles_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("TrafficManagerProfile reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(backends_api, watcher::Config::default());
        reflector(backends_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("TrafficManagerBackend reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(service_imports_api, watcher::Config::default());
        reflector(service_imports_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("ServiceImport reflector stream ended");
    });

    tokio::spawn(async move {
        let stream = watcher(exports_api, watcher::Config::default());
        reflector(exports_writer, stream)
            .for_each(|_| futures::future::ready(()))
            .await;
        warn!("InternalServiceExport reflector stream ended");
    });

    let stores = Stores {
        profiles: profiles_store,
        backends: backends_store,
        service_imports: service_imports_store,
        internal_service_exports: exports_store,
    };

    let context = Arc::new(Context {
        client,
        stores,
        traffic_manager,
        metrics: Metrics::default(),
    });

    info!("Shared context initialized with reflectors for all CRD types");

    Ok(context)
}

/// Start the Prometheus metrics HTTP server
///
/// Serves metrics on the configured port and path (default: 0.0.0.0:8080/metrics)
fn start_metrics_server() -> tokio::task::JoinHandle<()> {
    info!(
        bind_address = METRICS_SERVER_BIND_ADDRESS,
        port = METRICS_SERVER_PORT,
        path = METRICS_SERVER_PATH,
        "Starting Prometheus metrics HTTP server"
    );

    tokio::spawn(async move {
        async fn metrics_handler() -> String {
            match metrics::gather_metrics() {
                Ok(metrics_text) => metrics_text,
                Err(e) => {
                    error!("Failed to gather metrics: {}", e);
                    String::from("# Error gathering metrics\n")
                }
            }
        }

        let app = Router::new().route(METRICS_SERVER_PATH, get(metrics_handler));

        let bind_addr = format!("{METRICS_SERVER_BIND_ADDRESS}:{METRICS_SERVER_PORT}");
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!("Failed to bind metrics server to {bind_addr}: {e}");
                return;
            }
        };

        info!("Metrics server listening on http://{bind_addr}{METRICS_SERVER_PATH}");

        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {e}");
        }
    })
}

/// Leader election configuration
struct LeaderElectionConfig {
    enabled: bool,
    lease_name: String,
    lease_namespace: String,
    identity: String,
    lease_duration: u64,
    renew_deadline: u64,
    retry_period: u64,
}

/// Load leader election configuration from environment variables
fn load_leader_election_config() -> LeaderElectionConfig {
    let enabled = std::env::var("FLEETDNS_ENABLE_LEADER_ELECTION")
        .unwrap_or_else(|_| "true".to_string())
        .parse::<bool>()
        .unwrap_or(true);

    let lease_name =
        std::env::var("FLEETDNS_LEASE_NAME").unwrap_or_else(|_| "fleetdns-leader".to_string());

    let lease_namespace = std::env::var("FLEETDNS_LEASE_NAMESPACE")
        .or_else(|_| std::env::var("POD_NAMESPACE"))
        .unwrap_or_else(|_| "fleet-system".to_string());

    let lease_duration = std::env::var("FLEETDNS_LEASE_DURATION_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_DURATION_SECS);

    let renew_deadline = std::env::var("FLEETDNS_LEASE_RENEW_DEADLINE_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_RENEW_DEADLINE_SECS);

    let retry_period = std::env::var("FLEETDNS_LEASE_RETRY_PERIOD_SECONDS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(DEFAULT_LEASE_RETRY_PERIOD_SECS);

    let identity = std::env::var("POD_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| format!("fleetdns-{}", rand::random::<u32>()));

    LeaderElectionConfig {
        enabled,
        lease_name,
        lease_namespace,
        identity,
        lease_duration,
        renew_deadline,
        retry_period,
    }
}

/// Create a default watcher configuration.
///
/// Triggers on all changes including status updates. Used for the watched
/// source kinds, where upstream status (Programmed condition, cluster list)
/// is exactly what the backend reconciler consumes.
#[inline]
fn default_watcher_config() -> Config {
    Config::default()
}

/// Create a semantic watcher configuration.
///
/// Only triggers on semantic changes (spec modifications), ignoring
/// status-only updates. Used for the primary kind so the controller's own
/// status writes do not loop it.
#[inline]
fn semantic_watcher_config() -> Config {
    Config::default().any_semantic()
}

async fn async_main() -> Result<()> {
    initialize_logging();

    let (client, traffic_manager) = initialize_services().await?;

    let context = initialize_shared_context(client.clone(), traffic_manager).await?;

    let _metrics_handle = start_metrics_server();

    let leader_election_config = load_leader_election_config();

    if leader_election_config.enabled {
        info!(
            lease_name = %leader_election_config.lease_name,
            lease_namespace = %leader_election_config.lease_namespace,
            identity = %leader_election_config.identity,
            lease_duration_secs = leader_election_config.lease_duration,
            renew_deadline_secs = leader_election_config.renew_deadline,
            "Leader election enabled"
        );

        info!("Starting leader election, waiting to acquire leadership...");

        let lease_manager =
            LeaseManagerBuilder::new(client.clone(), &leader_election_config.lease_name)
                .with_namespace(&leader_election_config.lease_namespace)
                .with_identity(&leader_election_config.identity)
                .with_duration(leader_election_config.lease_duration)
                .with_grace(leader_election_config.retry_period)
                .build()
                .await?;

        let (leader_rx, lease_handle) = lease_manager.watch().await;

        // Wait until we become leader
        let mut rx = leader_rx.clone();
        while !*rx.borrow_and_update() {
            rx.changed().await?;
        }

        info!("Leadership acquired, starting controller...");
        metrics::record_leader_elected(&leader_election_config.identity);

        run_operator_with_leader_election(
            context,
            leader_rx,
            lease_handle,
            leader_election_config.identity.clone(),
        )
        .await?;
    } else {
        warn!("Leader election DISABLED - running without high availability");
        run_operator_without_leader_election(context).await?;
    }

    Ok(())
}

/// Monitor leadership status - returns when leadership is lost or an error occurs
async fn monitor_leadership(
    mut leader_rx: tokio::sync::watch::Receiver<bool>,
) -> Result<(), anyhow::Error> {
    loop {
        leader_rx.changed().await?;
        if !*leader_rx.borrow() {
            // Leadership lost
            return Ok(());
        }
    }
}

/// Wait for SIGTERM (sent by Kubernetes when deleting the pod)
async fn wait_for_sigterm() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        sigterm.recv().await;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        // On non-Unix platforms, just wait forever
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Run the operator without leader election, with signal handling
async fn run_operator_without_leader_election(context: Arc<Context>) -> Result<()> {
    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            result.map_err(anyhow::Error::from)
        }

        result = wait_for_sigterm() => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            result
        }

        result = run_trafficmanagerbackend_operator(context) => {
            error!("CRITICAL: TrafficManagerBackend operator exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("TrafficManagerBackend operator exited unexpectedly without error")
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully");

    Ok(())
}

/// Run the operator with leader election monitoring and signal handling.
///
/// If leadership is lost or SIGTERM/SIGINT is received, the controller is
/// stopped and the process exits gracefully.
async fn run_operator_with_leader_election(
    context: Arc<Context>,
    leader_rx: tokio::sync::watch::Receiver<bool>,
    _lease_handle: tokio::task::JoinHandle<
        Result<LeaseManager, kube_lease_manager::LeaseManagerError>,
    >,
    identity: String,
) -> Result<()> {
    info!("Running operator with leader election and signal handling");

    let shutdown_result: Result<()> = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            info!("Stopping operator and releasing leader election lease...");
            result.map_err(anyhow::Error::from)
        }

        result = wait_for_sigterm() => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
            info!("Stopping operator and releasing leader election lease...");
            result
        }

        result = monitor_leadership(leader_rx) => {
            metrics::record_leader_lost(&identity);
            match result {
                Ok(()) => {
                    warn!("Leadership lost! Stopping operator...");
                    anyhow::bail!("Leadership lost - stepping down")
                }
                Err(e) => {
                    error!("Leadership monitor error: {:?}", e);
                    anyhow::bail!("Leadership monitoring failed: {e}")
                }
            }
        }

        result = run_trafficmanagerbackend_operator(context) => {
            error!("CRITICAL: TrafficManagerBackend operator exited unexpectedly: {:?}", result);
            result?;
            anyhow::bail!("TrafficManagerBackend operator exited unexpectedly without error")
        }
    };

    shutdown_result?;
    info!("Graceful shutdown completed successfully, leader election lease released");
    Ok(())
}

/// Run the `TrafficManagerBackend` operator.
///
/// Event-driven architecture:
/// 1. Watches the backend itself (semantic: its own status writes must not
///    loop it)
/// 2. Watches `TrafficManagerProfile` - a profile change re-enqueues every
///    backend in the namespace referencing it by name
/// 3. Watches `ServiceImport` - an import change re-enqueues every backend
///    referencing it by name
/// 4. Watches `InternalServiceExport` - an export change re-enqueues the
///    backends of its service import, but only when the export's cluster is
///    already registered in the import's status; otherwise export creation
///    would storm every backend before the import even lists the cluster
async fn run_trafficmanagerbackend_operator(context: Arc<Context>) -> Result<()> {
    info!("Starting TrafficManagerBackend operator");

    let client = context.client.clone();
    let api = Api::<TrafficManagerBackend>::all(client.clone());
    let profile_api = Api::<TrafficManagerProfile>::all(client.clone());
    let import_api = Api::<ServiceImport>::all(client.clone());
    let export_api = Api::<InternalServiceExport>::all(client.clone());

    // Clone context for watch mapper closures
    let ctx_for_profiles = context.clone();
    let ctx_for_imports = context.clone();
    let ctx_for_exports = context.clone();

    Controller::new(api.clone(), semantic_watcher_config())
        .watches(profile_api, default_watcher_config(), move |profile| {
            let Some(namespace) = profile.namespace() else {
                return vec![];
            };
            let profile_name = profile.name_any();

            ctx_for_profiles
                .stores
                .backends_referencing_profile(&namespace, &profile_name)
                .into_iter()
                .map(|(name, ns)| ObjectRef::new(&name).within(&ns))
                .collect::<Vec<_>>()
        })
        .watches(import_api, default_watcher_config(), move |import| {
            let Some(namespace) = import.namespace() else {
                return vec![];
            };
            let import_name = import.name_any();

            ctx_for_imports
                .stores
                .backends_referencing_import(&namespace, &import_name)
                .into_iter()
                .map(|(name, ns)| ObjectRef::new(&name).within(&ns))
                .collect::<Vec<_>>()
        })
        .watches(export_api, default_watcher_config(), move |export| {
            // Resolve the referenced ServiceImport and fan out only when the
            // export's cluster is already registered in the import's status
            let service_ref = &export.spec.service_reference;
            let Some(import) = ctx_for_exports
                .stores
                .get_service_import(&service_ref.name, &service_ref.namespace)
            else {
                return vec![];
            };

            let cluster_registered = import.status.as_ref().is_some_and(|status| {
                status
                    .clusters
                    .iter()
                    .any(|c| c.cluster == service_ref.cluster_id)
            });
            if !cluster_registered {
                debug!(
                    cluster = %service_ref.cluster_id,
                    import = %service_ref.name,
                    "Export cluster not registered in import status yet; skipping fan-out"
                );
                return vec![];
            }

            ctx_for_exports
                .stores
                .backends_referencing_import(&service_ref.namespace, &service_ref.name)
                .into_iter()
                .map(|(name, ns)| ObjectRef::new(&name).within(&ns))
                .collect::<Vec<_>>()
        })
        .run(reconcile_trafficmanagerbackend_wrapper, error_policy, context)
        .for_each(|_| futures::future::ready(()))
        .await;

    Ok(())
}

/// Reconcile wrapper for `TrafficManagerBackend`
async fn reconcile_trafficmanagerbackend_wrapper(
    backend: Arc<TrafficManagerBackend>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = std::time::Instant::now();

    debug!(
        backend = %backend.name_any(),
        namespace = ?backend.namespace(),
        "Reconcile wrapper called for TrafficManagerBackend"
    );

    let result = Box::pin(reconcile_trafficmanagerbackend(
        ctx.clone(),
        (*backend).clone(),
    ))
    .await;
    let duration = start.elapsed();

    match result {
        Ok(()) => {
            metrics::record_reconciliation_success(KIND_TRAFFIC_MANAGER_BACKEND, duration);

            // Re-fetch to pick the status the reconcile just wrote; the
            // requeue cadence depends on it
            let namespace = backend.namespace().unwrap_or_default();
            let api: Api<TrafficManagerBackend> =
                Api::namespaced(ctx.client.clone(), &namespace);
            let accepted = match api.get(&backend.name_any()).await {
                Ok(updated) => updated
                    .status
                    .as_ref()
                    .and_then(|status| {
                        status
                            .conditions
                            .iter()
                            .find(|c| c.r#type == CONDITION_ACCEPTED)
                    })
                    .is_some_and(|c| c.status == STATUS_TRUE),
                Err(_) => {
                    // Deleted mid-flight; the next event (if any) drives us
                    return Ok(Action::await_change());
                }
            };

            if accepted {
                Ok(Action::requeue(Duration::from_secs(
                    REQUEUE_WHEN_ACCEPTED_SECS,
                )))
            } else {
                Ok(Action::requeue(Duration::from_secs(
                    REQUEUE_WHEN_NOT_ACCEPTED_SECS,
                )))
            }
        }
        Err(e) => {
            error!("Failed to reconcile TrafficManagerBackend: {}", e);
            metrics::record_reconciliation_error(KIND_TRAFFIC_MANAGER_BACKEND, duration);
            metrics::record_error(KIND_TRAFFIC_MANAGER_BACKEND, "reconcile_error");
            Err(e.into())
        }
    }
}

/// Error policy for the controller.
///
/// Returns an action to requeue the resource after a delay when
/// reconciliation fails.
#[allow(clippy::needless_pass_by_value)] // Signature required by kube::runtime::Controller
fn error_policy<T, C>(resource: Arc<T>, err: &ReconcileError, _ctx: Arc<C>) -> Action
where
    T: std::fmt::Debug,
{
    error!(
        error = %err,
        resource = ?resource,
        "Reconciliation error - will retry in {}s",
        ERROR_REQUEUE_DURATION_SECS
    );
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
}
