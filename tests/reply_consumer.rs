//! Tests for the responding side: `SyncConsumer` receive, reply-to
//! registration and reply routing.

mod common;

use std::{sync::Arc, time::Duration};

use common::{REQUESTS, TestResult, broker, consumer, server_config};
use replyframe::{
    ExchangeError,
    correlation::{DefaultCorrelator, ExchangeScope},
    destination::Destination,
    memory::{WireConverter, WireMessage},
    message::{Message, ReplyTo},
    selector::Selector,
    timeout::Timeout,
    transport::{MessageConverter, Transport},
};
use replyframe_testing::{CountingBroker, LoggerHandle, logger, send_expect, timeout_expect};
use rstest::rstest;
use serial_test::serial;

async fn enqueue(broker: &CountingBroker, message: &Message) -> TestResult {
    broker
        .send(&Destination::queue(REQUESTS), WireConverter.to_raw(message)?)
        .await?;
    Ok(())
}

async fn take(broker: &CountingBroker, destination: &Destination) -> TestResult<Option<WireMessage>> {
    Ok(broker.receive(destination, None, Timeout::Immediate).await?)
}

#[rstest]
#[tokio::test]
async fn reply_is_routed_to_request_reply_to(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    let replies = Destination::queue("client.replies");
    enqueue(
        &broker,
        &Message::with_id("req-1", "question").reply_to(ReplyTo::Destination(replies.clone())),
    )
    .await?;

    let scope = ExchangeScope::new();
    let request = consumer.receive(&scope).await?;
    assert_eq!(request.payload_str(), Some("question"));
    assert_eq!(consumer.tracker().routes().len(), 1);

    send_expect!(consumer.send(Message::with_id("rep-1", "answer"), &scope));
    let reply = take(&broker, &replies).await?.expect("reply delivered");
    assert_eq!(reply.message_id, "rep-1");
    assert_eq!(reply.correlation_id.as_deref(), Some("req-1"));
    assert!(consumer.tracker().routes().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test]
async fn existing_correlation_id_is_kept(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    let replies = Destination::queue("client.replies");
    enqueue(
        &broker,
        &Message::with_id("req-2", "").reply_to(ReplyTo::Destination(replies.clone())),
    )
    .await?;

    let scope = ExchangeScope::new();
    consumer.receive(&scope).await?;
    let mut reply = Message::new("answer");
    reply.set_correlation_id("custom");
    consumer.send(reply, &scope).await?;

    let reply = take(&broker, &replies).await?.expect("reply delivered");
    assert_eq!(reply.correlation_id.as_deref(), Some("custom"));
    Ok(())
}

#[rstest]
#[tokio::test]
async fn named_reply_to_is_resolved(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    enqueue(
        &broker,
        &Message::with_id("req-3", "").reply_to(ReplyTo::Name("answers".into())),
    )
    .await?;

    let scope = ExchangeScope::new();
    let request = consumer.receive(&scope).await?;
    assert_eq!(request.get_reply_to(), Some(&ReplyTo::Name("answers".into())));
    consumer.send(Message::new("ok"), &scope).await?;
    assert!(take(&broker, &Destination::queue("answers")).await?.is_some());
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial(logging)]
async fn request_without_reply_to_is_returned_with_warning(
    broker: Arc<CountingBroker>,
    mut logger: LoggerHandle,
) -> TestResult {
    let consumer = consumer(&broker, server_config("server").timeout_millis(50))?;
    enqueue(&broker, &Message::with_id("one-way", "fire and forget")).await?;

    let scope = ExchangeScope::new();
    let request = consumer.receive(&scope).await?;
    assert_eq!(request.id(), "one-way");
    assert!(logger.contains(log::Level::Warn, "no reply-to"));

    let err = consumer
        .send(Message::new("nobody listens"), &scope)
        .await
        .expect_err("no reply destination");
    assert_eq!(
        err.to_string(),
        "failed to find reply destination for message correlation key: 'message_id = 'one-way''"
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn send_before_any_request_reports_unknown_key(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    let err = consumer
        .send(Message::new("early"), &ExchangeScope::new())
        .await
        .expect_err("nothing received");
    assert!(matches!(
        err,
        ExchangeError::CorrelationKeyNotFound { ref name } if name == "message_correlator:server"
    ));
    Ok(())
}

#[rstest]
#[tokio::test]
#[serial(logging)]
async fn missing_correlation_field_does_not_fail_receive(
    broker: Arc<CountingBroker>,
    mut logger: LoggerHandle,
) -> TestResult {
    let consumer = consumer(
        &broker,
        server_config("server").correlator(Arc::new(DefaultCorrelator::on_field("order"))),
    )?;
    enqueue(
        &broker,
        &Message::new("").reply_to(ReplyTo::Destination(Destination::queue("r"))),
    )
    .await?;

    let scope = ExchangeScope::new();
    assert!(consumer.receive(&scope).await.is_ok());
    assert!(logger.contains(log::Level::Warn, "unable to save reply destination"));
    assert!(consumer.tracker().routes().is_empty());
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn empty_destination_times_out(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    let err = timeout_expect!(consumer.receive_selected(
        None,
        Timeout::after(Duration::from_millis(100)),
        &ExchangeScope::new(),
    ));
    assert_eq!(
        err.to_string(),
        "no message received within 100ms on destination 'requests'"
    );
    Ok(())
}

#[rstest]
#[tokio::test]
async fn selector_picks_matching_request(broker: Arc<CountingBroker>) -> TestResult {
    let consumer = consumer(&broker, server_config("server"))?;
    enqueue(&broker, &Message::with_id("a", "").header("operation", "sayHello")).await?;
    enqueue(&broker, &Message::with_id("b", "").header("operation", "sayGoodbye")).await?;

    let selector: Selector = "operation = 'sayGoodbye'".parse()?;
    let request = consumer
        .receive_selected(Some(&selector), Timeout::Immediate, &ExchangeScope::new())
        .await?;
    assert_eq!(request.id(), "b");
    assert_eq!(broker.broker().depth(&Destination::queue(REQUESTS)), 1);
    Ok(())
}
