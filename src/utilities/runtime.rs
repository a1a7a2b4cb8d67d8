//! Drives async HTTP clients from the synchronous crew engine.

use std::future::Future;

/// Run `future` to completion on a fresh single-threaded runtime.
///
/// Must not be called from inside a tokio runtime.
pub fn block_on<F: Future>(future: F) -> std::io::Result<F::Output> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(rt.block_on(future))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_returns_output() {
        let out = block_on(async { 21 * 2 }).unwrap();
        assert_eq!(out, 42);
    }
}
