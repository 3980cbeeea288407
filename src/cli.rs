//! Command line interface for the replyframe demo binary.
//!
//! The binary runs one request/reply exchange over the in-memory broker; the
//! options shape that exchange.

use clap::Parser;

/// Command line arguments for the `replyframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "replyframe",
    version,
    about = "Run a loop-back request/reply exchange over an in-memory broker"
)]
pub struct Cli {
    /// Request payload.
    #[arg(short, long, default_value = "ping")]
    pub payload: String,

    /// Queue the request is sent to.
    #[arg(short, long, default_value = "requests")]
    pub queue: String,

    /// Reply wait in milliseconds; -1 waits indefinitely.
    #[arg(short, long, default_value_t = 5_000, allow_negative_numbers = true)]
    pub timeout_millis: i64,

    /// Use a temporary topic instead of a temporary queue for the reply.
    #[arg(long)]
    pub pub_sub: bool,

    /// Do not start the responder, so the exchange times out.
    #[arg(long)]
    pub no_responder: bool,
}
