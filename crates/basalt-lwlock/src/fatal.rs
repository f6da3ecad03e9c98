use log::error;

use crate::error::Fatal;

/// Terminate the process for a detected programming error.
///
/// Lock invariants cannot be trusted past this point, so the process aborts
/// without unwinding, whatever the panic strategy. This crate's own unit
/// tests panic instead so `#[should_panic]` can observe the reason.
///
/// Must never be called while a slot spinlock is held.
#[cold]
pub fn abort(reason: Fatal) -> ! {
    error!("PANIC: {}", reason);
    log::logger().flush();
    if cfg!(test) {
        panic!("{}", reason);
    }
    std::process::abort()
}
