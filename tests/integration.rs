//! Integration tests for the meshmq subscription index
//!
//! These tests drive the public service API end to end: both subscription
//! lanes, the inner cache, and multi-node convergence over an in-process
//! event bus and a shared in-process store.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use meshmq::cluster::{EventBus, EventCodec, InternalMessage, MemoryBus, SubEvent};
use meshmq::{ClientSub, Config, MemoryStore, QoS, RemoteStore, SubscriptionService};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_config(broker_id: u32, cache: bool, cluster: bool) -> Config {
    let mut config = Config::default();
    config.broker_id = broker_id;
    config.cache.enabled = cache;
    config.cluster.enabled = cluster;
    config
}

/// Poll an async condition until it holds or two seconds elapse.
async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if condition().await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn single_node(cache: bool) -> (Arc<SubscriptionService>, Arc<MemoryStore>) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let service = SubscriptionService::new(&test_config(1, cache, false), store.clone(), None)
        .await
        .unwrap();
    (service, store)
}

/// Two clustered nodes sharing one store and one bus.
async fn two_nodes(
    cache: bool,
) -> (
    Arc<SubscriptionService>,
    Arc<SubscriptionService>,
    Arc<MemoryStore>,
    Arc<MemoryBus>,
) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(MemoryBus::new());
    let a = SubscriptionService::new(
        &test_config(1, cache, true),
        store.clone(),
        Some(bus.clone() as Arc<dyn EventBus>),
    )
    .await
    .unwrap();
    let b = SubscriptionService::new(
        &test_config(2, cache, true),
        store.clone(),
        Some(bus.clone() as Arc<dyn EventBus>),
    )
    .await
    .unwrap();
    (a, b, store, bus)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ephemeral_wildcard_lookup() {
    let (service, _store) = single_node(false).await;

    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "a/+/c", true))
        .await
        .unwrap();

    let matches = service.search_subscribe_client_list("a/b/c").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].client_id.as_ref(), "c1");
    assert_eq!(matches[0].topic.as_ref(), "a/+/c");
    assert_eq!(matches[0].qos, QoS::AtLeastOnce);

    assert!(service.search_subscribe_client_list("a/b").await.unwrap().is_empty());
    assert!(service.search_subscribe_client_list("x/b/c").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_durable_resubscribe_replaces_qos() {
    let (service, store) = single_node(false).await;

    service
        .subscribe(ClientSub::new("c1", QoS::AtMostOnce, "t", false))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c1", QoS::ExactlyOnce, "t", false))
        .await
        .unwrap();

    let entries = store.hash_entries("meshmq:topic:t").await.unwrap();
    assert_eq!(entries, vec![("c1".to_string(), "2".to_string())]);

    let matches = service.search_subscribe_client_list("t").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].qos, QoS::ExactlyOnce);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_is_idempotent() {
    let (service, _store) = single_node(false).await;

    let record = ClientSub::new("c1", QoS::AtLeastOnce, "a/b", false);
    service.subscribe(record.clone()).await.unwrap();
    service.subscribe(record).await.unwrap();

    assert_eq!(service.search_subscribe_client_list("a/b").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_subscribe_then_unsubscribe_restores_prior_state() {
    let (service, store) = single_node(false).await;

    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "mem/t", true))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "disk/t", false))
        .await
        .unwrap();

    service
        .unsubscribe("c1", true, vec!["mem/t".to_string()])
        .await
        .unwrap();
    service
        .unsubscribe("c1", false, vec!["disk/t".to_string()])
        .await
        .unwrap();

    assert!(service.search_subscribe_client_list("mem/t").await.unwrap().is_empty());
    assert!(service.search_subscribe_client_list("disk/t").await.unwrap().is_empty());
    assert!(store
        .hash_entries("meshmq:topic:disk/t")
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .set_members("meshmq:client:topics:c1")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unsubscribe_empty_topic_list_is_noop() {
    let (service, _store) = single_node(false).await;
    service.unsubscribe("c1", true, Vec::new()).await.unwrap();
    service.unsubscribe("c1", false, Vec::new()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clear_client_durable_subscriptions() {
    let (service, store) = single_node(false).await;

    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "t", false))
        .await
        .unwrap();
    service.clear_client_subscriptions("c1", false).await.unwrap();

    assert!(store
        .set_members("meshmq:client:topics:c1")
        .await
        .unwrap()
        .is_empty());
    assert!(store.hash_entries("meshmq:topic:t").await.unwrap().is_empty());
    assert!(service.search_subscribe_client_list("t").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lookup_deduplicates_across_lanes() {
    let (service, _store) = single_node(false).await;

    // The same (client, topic) pair on both lanes, as can happen around a
    // session-flag transition
    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "t", true))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c1", QoS::AtMostOnce, "t", false))
        .await
        .unwrap();

    assert_eq!(service.search_subscribe_client_list("t").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sys_topic_isolation() {
    let (service, _store) = single_node(false).await;

    service.subscribe_sys(ClientSub::new("c1", QoS::AtMostOnce, "$SYS/broker/uptime", true));

    // The general lookup never crosses into the system topic space
    assert!(service
        .search_subscribe_client_list("$SYS/broker/uptime")
        .await
        .unwrap()
        .is_empty());

    let matches = service.search_sys_topic_clients("$SYS/broker/uptime");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].client_id.as_ref(), "c1");

    service.clear_client_sys_subscriptions("c1");
    assert!(service.search_sys_topic_clients("$SYS/broker/uptime").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cluster_ephemeral_convergence() {
    let (a, b, _store, _bus) = two_nodes(false).await;

    a.subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "a/+/c", true))
        .await
        .unwrap();

    let b2 = b.clone();
    assert!(
        eventually(move || {
            let b = b2.clone();
            async move {
                let matches = b.search_subscribe_client_list("a/b/c").await.unwrap();
                matches.len() == 1 && matches[0].client_id.as_ref() == "c1"
            }
        })
        .await,
        "peer node never observed the subscription"
    );

    // The originating node applied it exactly once despite the bus echo
    assert_eq!(a.search_subscribe_client_list("a/b/c").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cluster_ephemeral_unsubscribe_converges() {
    let (a, b, _store, _bus) = two_nodes(false).await;

    a.subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "t", true))
        .await
        .unwrap();

    let b2 = b.clone();
    assert!(
        eventually(move || {
            let b = b2.clone();
            async move { !b.search_subscribe_client_list("t").await.unwrap().is_empty() }
        })
        .await
    );

    a.unsubscribe("c1", true, vec!["t".to_string()]).await.unwrap();

    let b2 = b.clone();
    assert!(
        eventually(move || {
            let b = b2.clone();
            async move { b.search_subscribe_client_list("t").await.unwrap().is_empty() }
        })
        .await,
        "peer node never observed the unsubscribe"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cluster_cache_convergence() {
    let (a, b, _store, _bus) = two_nodes(true).await;

    a.subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "a/+", false))
        .await
        .unwrap();

    // The originating node's mirror is updated before the broadcast
    assert_eq!(a.search_subscribe_client_list("a/b").await.unwrap().len(), 1);

    // The peer serves lookups from its own cache, fed by gossip
    let b2 = b.clone();
    assert!(
        eventually(move || {
            let b = b2.clone();
            async move {
                let matches = b.search_subscribe_client_list("a/b").await.unwrap();
                matches.len() == 1 && matches[0].qos == QoS::AtLeastOnce
            }
        })
        .await,
        "peer cache never converged after subscribe"
    );

    a.unsubscribe("c1", false, vec!["a/+".to_string()]).await.unwrap();

    let b2 = b.clone();
    assert!(
        eventually(move || {
            let b = b2.clone();
            async move { b.search_subscribe_client_list("a/b").await.unwrap().is_empty() }
        })
        .await,
        "peer cache never converged after unsubscribe"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_del_topic_event_prunes_everywhere() {
    let (a, _b, store, bus) = two_nodes(true).await;

    a.subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "t", true))
        .await
        .unwrap();
    a.subscribe(ClientSub::new("c2", QoS::AtMostOnce, "t", false))
        .await
        .unwrap();
    assert_eq!(a.search_subscribe_client_list("t").await.unwrap().len(), 2);

    // Topic deletion arrives from an administrative origin, never from the
    // index itself
    let config = test_config(99, false, true);
    let codec = EventCodec::new(config.cluster.codec);
    let payload = codec
        .encode(&InternalMessage::new(SubEvent::del_topic("t"), 99))
        .unwrap();
    bus.publish(&config.cluster.channel, Bytes::from(payload))
        .await
        .unwrap();

    let a2 = a.clone();
    assert!(
        eventually(move || {
            let a = a2.clone();
            async move { a.search_subscribe_client_list("t").await.unwrap().is_empty() }
        })
        .await,
        "topic deletion never drained the subscriptions"
    );
    assert!(store.set_members("meshmq:topics").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cache_rebuilt_from_store_on_startup() {
    let store = Arc::new(MemoryStore::new());

    // A prior process wrote durable subscriptions
    {
        let service = SubscriptionService::new(&test_config(1, false, false), store.clone(), None)
            .await
            .unwrap();
        service
            .subscribe(ClientSub::new("c1", QoS::ExactlyOnce, "a/#", false))
            .await
            .unwrap();
    }

    // A fresh node with the cache enabled serves the subscription without
    // further store writes
    let service = SubscriptionService::new(&test_config(2, true, false), store.clone(), None)
        .await
        .unwrap();
    let matches = service.search_subscribe_client_list("a/b/c").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].client_id.as_ref(), "c1");
    assert_eq!(matches[0].qos, QoS::ExactlyOnce);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_clear_unauthorized_subscriptions() {
    let (service, _store) = single_node(false).await;

    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "a", false))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c1", QoS::AtLeastOnce, "b", false))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c1", QoS::AtMostOnce, "c", true))
        .await
        .unwrap();
    service
        .subscribe(ClientSub::new("c2", QoS::AtLeastOnce, "b", false))
        .await
        .unwrap();

    service
        .clear_unauthorized_subscriptions("c1", &["a".to_string()])
        .await
        .unwrap();

    // c1 keeps only the authorized topic
    let matches = service.search_subscribe_client_list("a").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert!(service.search_subscribe_client_list("c").await.unwrap().is_empty());

    // Revocation is scoped to c1; c2 keeps its subscription
    let matches = service.search_subscribe_client_list("b").await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].client_id.as_ref(), "c2");
}
