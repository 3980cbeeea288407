//! End-to-end request/reply exchanges between `SyncProducer` and
//! `SyncConsumer` over the in-memory broker.

mod common;

use std::{sync::Arc, time::Duration};

use common::{
    Consumer,
    REQUESTS,
    TestResult,
    broker,
    client_config,
    consumer,
    producer,
    server_config,
};
use futures::future::join_all;
use replyframe::{
    ExchangeError,
    correlation::{Correlator, DefaultCorrelator, ExchangeScope, Scope},
    destination::{Destination, DestinationKind},
    endpoint::{SyncEndpointConfig, SyncEndpointConfigBuilder, reply_to_variable},
    message::{Message, ReplyTo},
    timeout::Timeout,
    transport::Transport,
};
use replyframe_testing::{CountingBroker, LoggerHandle, logger, recv_expect};
use rstest::rstest;
use serial_test::serial;
use tokio::time::Instant;

/// Answer `count` requests, prefixing each payload with `re: `.
async fn respond(consumer: Arc<Consumer>, count: usize) -> TestResult {
    for _ in 0..count {
        let scope = ExchangeScope::new();
        let request = consumer.receive(&scope).await?;
        let body = format!("re: {}", request.payload_str().unwrap_or_default());
        consumer.send(Message::new(body), &scope).await?;
    }
    Ok(())
}

fn spawn_responder(broker: &Arc<CountingBroker>, count: usize) -> TestResult<tokio::task::JoinHandle<TestResult>> {
    let consumer = Arc::new(consumer(broker, server_config("responder"))?);
    Ok(tokio::spawn(respond(consumer, count)))
}

#[rstest]
#[tokio::test]
async fn reply_arrives_on_temporary_destination(broker: Arc<CountingBroker>) -> TestResult {
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(&broker, client_config("client"))?;

    let request = Message::with_id("req-a", "hello");
    let reply = producer
        .send_and_receive(request, Timeout::after(Duration::from_secs(2)), &ExchangeScope::new())
        .await?;
    responder.await??;

    assert_eq!(reply.payload_str(), Some("re: hello"));
    assert_eq!(reply.correlation_id(), Some("req-a"));
    assert_eq!(broker.created(), 1);
    assert_eq!(broker.deleted(), 1);
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_responder_times_out_and_releases_destination(
    broker: Arc<CountingBroker>,
) -> TestResult {
    let producer = producer(&broker, client_config("client"))?;
    let deadline = Timeout::from_millis(500)?;

    let started = Instant::now();
    let err = producer
        .send_and_receive(Message::with_id("req-b", "anyone?"), deadline, &ExchangeScope::new())
        .await
        .expect_err("nobody answers");
    let waited = started.elapsed();

    match err {
        ExchangeError::ReplyTimeout {
            deadline: reported,
            reply_address,
            correlation_key,
        } => {
            assert_eq!(reported, deadline);
            assert!(reply_address.starts_with("tmp-queue-"));
            assert_eq!(correlation_key.as_str(), "message_id = 'req-b'");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(waited >= Duration::from_millis(500));
    assert!(waited < Duration::from_millis(600));
    assert_eq!(broker.created(), 1);
    assert_eq!(broker.deleted(), 1);
    Ok(())
}

#[rstest]
#[case::success(true)]
#[case::timeout(false)]
#[tokio::test(start_paused = true)]
async fn temporary_destination_is_deleted_exactly_once(
    broker: Arc<CountingBroker>,
    #[case] answered: bool,
) -> TestResult {
    let responder = answered.then(|| spawn_responder(&broker, 1)).transpose()?;
    let producer = producer(&broker, client_config("client").pub_sub_domain(true))?;

    let outcome = producer
        .send_and_receive(
            Message::new("ping"),
            Timeout::after(Duration::from_millis(300)),
            &ExchangeScope::new(),
        )
        .await;
    if let Some(responder) = responder {
        responder.await??;
    }

    assert_eq!(outcome.is_ok(), answered);
    assert_eq!(broker.created(), 1);
    assert_eq!(broker.deleted(), 1);
    // Replies to temporary topics never reach the named request queue.
    assert_eq!(broker.broker().depth(&Destination::queue(REQUESTS)), 0);
    Ok(())
}

#[rstest]
#[case::fixed(client_config("client").reply_destination(Destination::queue("replies")))]
#[case::named(client_config("client").reply_destination_name("named.replies"))]
#[tokio::test]
async fn shared_reply_destinations_need_no_temporary(
    broker: Arc<CountingBroker>,
    #[case] config: SyncEndpointConfigBuilder,
) -> TestResult {
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(&broker, config)?;

    let reply = producer
        .send_and_receive(
            Message::new("shared"),
            Timeout::after(Duration::from_secs(2)),
            &ExchangeScope::new(),
        )
        .await?;
    responder.await??;

    assert_eq!(reply.payload_str(), Some("re: shared"));
    assert_eq!(broker.created(), 0);
    assert_eq!(broker.deleted(), 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn embedded_reply_to_takes_precedence(broker: Arc<CountingBroker>) -> TestResult {
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(
        &broker,
        client_config("client").reply_destination(Destination::queue("configured")),
    )?;
    let scope = ExchangeScope::new();

    let embedded = Destination::queue("embedded");
    let request = Message::new("direct").reply_to(ReplyTo::Destination(embedded.clone()));
    let reply = producer
        .send_and_receive(request, Timeout::after(Duration::from_secs(2)), &scope)
        .await?;
    responder.await??;

    assert_eq!(reply.payload_str(), Some("re: direct"));
    let key_name = DefaultCorrelator::default().correlation_key_name("client");
    assert_eq!(
        scope.variable(&reply_to_variable(&key_name)).as_deref(),
        Some("embedded")
    );
    assert_eq!(broker.created(), 0);
    Ok(())
}

#[rstest]
#[case::temporary(client_config("client"))]
#[case::fixed(client_config("client").reply_destination(Destination::queue("replies")))]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_exchanges_receive_only_their_own_reply(
    broker: Arc<CountingBroker>,
    #[case] config: SyncEndpointConfigBuilder,
) -> TestResult {
    const EXCHANGES: usize = 16;
    let responder = spawn_responder(&broker, EXCHANGES)?;
    let producer = Arc::new(producer(&broker, config)?);

    let exchanges = (0..EXCHANGES).map(|i| {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move {
            producer
                .send_and_receive(
                    Message::new(format!("payload-{i}")),
                    Timeout::after(Duration::from_secs(5)),
                    &ExchangeScope::new(),
                )
                .await
                .map(|reply| (i, reply))
        })
    });
    for outcome in join_all(exchanges).await {
        let (i, reply) = outcome??;
        assert_eq!(reply.payload_str(), Some(format!("re: payload-{i}").as_str()));
    }
    responder.await??;
    assert_eq!(broker.created(), broker.deleted());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn reply_deposited_in_store_completes_shared_exchange(
    broker: Arc<CountingBroker>,
) -> TestResult {
    let producer = Arc::new(producer(
        &broker,
        client_config("client").reply_destination(Destination::queue("replies")),
    )?);
    let key = DefaultCorrelator::default().key_for_value("req-store");

    let depositor = Arc::clone(&producer);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        depositor
            .reply_store()
            .store(key, Message::with_id("reply-store", "from store"));
    });

    let reply = producer
        .send_and_receive(
            Message::with_id("req-store", "ping"),
            Timeout::after(Duration::from_secs(2)),
            &ExchangeScope::new(),
        )
        .await?;
    assert_eq!(reply.id(), "reply-store");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn split_send_then_receive_returns_stored_reply(broker: Arc<CountingBroker>) -> TestResult {
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(&broker, client_config("client"))?;
    let scope = ExchangeScope::new();

    producer.send(Message::new("split"), &scope).await?;
    responder.await??;
    let reply = recv_expect!(producer.receive(&scope));
    assert_eq!(reply.payload_str(), Some("re: split"));

    let err = producer
        .receive_with_timeout(&scope, Timeout::Immediate)
        .await
        .expect_err("reply already taken");
    match err {
        ExchangeError::ReplyTimeout { reply_address, .. } => {
            assert!(reply_address.starts_with("tmp-queue-"), "{reply_address}");
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[rstest]
#[tokio::test]
async fn receive_without_send_reports_unknown_key(broker: Arc<CountingBroker>) -> TestResult {
    let producer = producer(&broker, client_config("client"))?;
    let err = producer
        .receive(&ExchangeScope::new())
        .await
        .expect_err("nothing sent");
    assert_eq!(
        err.to_string(),
        "failed to get correlation key for 'message_correlator:client'"
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn allocation_failure_aborts_before_sending(broker: Arc<CountingBroker>) -> TestResult {
    broker.fail_allocations(true);
    let producer = producer(&broker, client_config("client"))?;

    let err = producer
        .send_and_receive(Message::new("x"), Timeout::Immediate, &ExchangeScope::new())
        .await
        .expect_err("allocation fails");
    assert!(matches!(err, ExchangeError::DestinationAllocation(_)));
    assert_eq!(broker.broker().depth(&Destination::queue(REQUESTS)), 0);
    assert_eq!(broker.deleted(), 0);
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unset_destination_is_reported(broker: Arc<CountingBroker>) -> TestResult {
    let producer = producer(&broker, SyncEndpointConfig::builder("client"))?;
    let err = producer
        .send_and_receive(Message::new("x"), Timeout::Immediate, &ExchangeScope::new())
        .await
        .expect_err("no destination");
    assert!(matches!(err, ExchangeError::DestinationNotSet));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn destination_name_is_resolved(broker: Arc<CountingBroker>) -> TestResult {
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(
        &broker,
        SyncEndpointConfig::builder("client").destination_name(REQUESTS),
    )?;
    let reply = producer
        .send_and_receive(
            Message::new("by name"),
            Timeout::after(Duration::from_secs(2)),
            &ExchangeScope::new(),
        )
        .await?;
    responder.await??;
    assert_eq!(reply.payload_str(), Some("re: by name"));
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial(logging)]
async fn cleanup_failure_is_logged_not_raised(
    broker: Arc<CountingBroker>,
    mut logger: LoggerHandle,
) -> TestResult {
    broker.fail_deletions(true);
    let responder = spawn_responder(&broker, 1)?;
    let producer = producer(&broker, client_config("client"))?;

    let reply = producer
        .send_and_receive(
            Message::new("cleanup"),
            Timeout::after(Duration::from_secs(2)),
            &ExchangeScope::new(),
        )
        .await?;
    responder.await??;

    assert_eq!(reply.payload_str(), Some("re: cleanup"));
    assert_eq!(broker.deleted(), 1);
    assert!(logger.contains(log::Level::Error, "error while deleting temporary destination"));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn dropped_exchange_still_deletes_temporary(broker: Arc<CountingBroker>) -> TestResult {
    let producer = Arc::new(producer(&broker, client_config("client"))?);
    let exchange = {
        let producer = Arc::clone(&producer);
        tokio::spawn(async move {
            producer
                .send_and_receive(Message::new("abandoned"), Timeout::Indefinite, &ExchangeScope::new())
                .await
        })
    };
    while broker.created() == 0 {
        tokio::task::yield_now().await;
    }
    exchange.abort();
    assert!(exchange.await.is_err_and(|e| e.is_cancelled()));

    for _ in 0..100 {
        if broker.deleted() == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(broker.deleted(), 1);
    let temp = Destination::temporary("tmp-queue-0", DestinationKind::Queue);
    assert_eq!(broker.deletions_of(&temp), 1);
    assert!(!broker.broker().is_allocated(&temp));
    // The abandoned request is still queued for a responder.
    assert_eq!(
        broker
            .receive(&Destination::queue(REQUESTS), None, Timeout::Immediate)
            .await?
            .map(|raw| raw.body),
        Some("abandoned".into())
    );
    Ok(())
}
