//! Small full-screen terminal dialogs built on [ratatui] and [crossterm].

mod continue_prompt;
mod device_selector;
mod error;

pub use continue_prompt::ContinueDialog;
pub use device_selector::device_selector;
pub use error::GuiError;

use crossterm::{
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{stdout, Stdout};

type Screen = Terminal<CrosstermBackend<Stdout>>;

/// Runs `f` on the alternate screen in raw mode, and puts the terminal back
/// afterwards whether or not `f` succeeded.
fn with_screen<T>(f: impl FnOnce(&mut Screen) -> Result<T, GuiError>) -> Result<T, GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let result = Terminal::new(CrosstermBackend::new(stdout()))
        .map_err(GuiError::from)
        .and_then(|mut terminal| {
            terminal.clear()?;
            f(&mut terminal)
        });

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    result
}
