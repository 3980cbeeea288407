//! Demo binary running one synchronous exchange over the in-memory broker.
//!
//! A responder task echoes each request back in upper case; the producer
//! sends the payload given on the command line and prints the reply.

mod cli;

use std::sync::Arc;

use clap::Parser;
use replyframe::{
    correlation::ExchangeScope,
    destination::Destination,
    endpoint::{SyncConsumer, SyncEndpointConfig, SyncProducer},
    memory::{InMemoryBroker, WireConverter},
    message::Message,
};
use tracing::{error, info};

async fn respond_once(consumer: SyncConsumer<InMemoryBroker, WireConverter>) {
    let scope = ExchangeScope::new();
    let request = match consumer.receive(&scope).await {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "responder received no request");
            return;
        }
    };
    let body = request.payload_str().unwrap_or_default().to_uppercase();
    if let Err(e) = consumer.send(Message::new(body), &scope).await {
        error!(error = %e, "responder failed to reply");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = cli::Cli::parse();
    let broker = Arc::new(InMemoryBroker::new());
    let requests = Destination::queue(&cli.queue);

    let producer_config = SyncEndpointConfig::builder("demo-client")
        .destination(requests.clone())
        .pub_sub_domain(cli.pub_sub)
        .timeout_millis(cli.timeout_millis)
        .build()?;
    let consumer_config = SyncEndpointConfig::builder("demo-server")
        .destination(requests)
        .pub_sub_domain(cli.pub_sub)
        .build()?;

    let producer = SyncProducer::new(producer_config, Arc::clone(&broker), WireConverter);
    let consumer = SyncConsumer::new(consumer_config, broker, WireConverter);
    let responder = (!cli.no_responder).then(|| tokio::spawn(respond_once(consumer)));

    let deadline = producer.config().timeout();
    let scope = ExchangeScope::new();
    let reply = producer
        .send_and_receive(Message::new(cli.payload), deadline, &scope)
        .await;
    if let Some(responder) = responder {
        responder.abort();
    }

    let reply = reply?;
    info!(reply_id = reply.id(), correlation_id = ?reply.correlation_id(), "exchange completed");
    println!("{}", reply.payload_str().unwrap_or("<binary reply>"));
    Ok(())
}
