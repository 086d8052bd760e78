/// Runs a cleanup closure when dropped, on normal exit and while a panic
/// unwinds alike.
///
/// The TUI uses it to leave raw mode and the alternate screen whatever
/// happens to the main loop.
///
/// ```
/// use maiide::utils::guard::ExitGuard;
///
/// let _restore = ExitGuard::new(|| println!("terminal restored"));
/// ```
pub struct ExitGuard<F: FnOnce()> {
    on_exit: Option<F>,
}

impl<F: FnOnce()> ExitGuard<F> {
    pub fn new(on_exit: F) -> Self {
        Self {
            on_exit: Some(on_exit),
        }
    }

    /// Drop the guard without running the closure.
    pub fn disarm(mut self) {
        self.on_exit = None;
    }
}

impl<F: FnOnce()> Drop for ExitGuard<F> {
    fn drop(&mut self) {
        if let Some(on_exit) = self.on_exit.take() {
            on_exit()
        }
    }
}
