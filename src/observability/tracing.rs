use tracing::Span;

pub fn trace_poll_cycle(job_id: &str) -> Span {
    tracing::info_span!(
        "poll_cycle",
        job_id = %job_id,
    )
}

pub fn trace_moving_average(symbol: &str, window: usize) -> Span {
    tracing::info_span!(
        "moving_average",
        symbol = %symbol,
        window = window,
    )
}
