//! Heartbeat loop

use super::context::{LoopContext, SignalKind};
use crate::connection::SessionNotice;
use crate::protocol::{ClientCloseReason, GatewayMessage};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Beat on the session's interval until cancelled or timed out
///
/// A beat that finds the previous one still unacknowledged ends the loop
/// with exactly one resume request.
pub(crate) async fn run(ctx: LoopContext, jitter: bool) {
    let period = ctx.session.heartbeat_interval();
    if period.is_zero() {
        tracing::warn!(generation = ctx.generation, "Heartbeat interval is zero; not beating");
        return;
    }

    let first = if jitter {
        period.mul_f64(rand::random::<f64>())
    } else {
        period
    };
    let mut ticker = interval_at(Instant::now() + first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!(
        generation = ctx.generation,
        interval_ms = period.as_millis() as u64,
        first_ms = first.as_millis() as u64,
        "Heartbeat loop started"
    );

    loop {
        tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if ctx.session.is_awaiting_ack() {
            tracing::warn!(
                generation = ctx.generation,
                seq = ?ctx.session.sequence(),
                "Heartbeat not acknowledged; reconnecting"
            );
            *ctx.close_reason.lock() = ClientCloseReason::HeartbeatTimeout;
            ctx.notify(SessionNotice::HeartbeatTimedOut);
            ctx.signal(SignalKind::Reconnect { resume: true });
            return;
        }

        ctx.session.mark_beat();
        tracing::trace!(seq = ?ctx.session.sequence(), "Heartbeat");
        ctx.send(GatewayMessage::heartbeat(ctx.session.sequence()));
    }
}
