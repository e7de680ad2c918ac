use std::time::Duration;

use crate::control_loop::ContinuePrompt;
use crate::gui::{error::GuiError, with_screen};

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::error;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// Asks the operator, full screen, whether to recalibrate and run again.
#[derive(Debug, Default)]
pub struct ContinueDialog {
    runs: usize,
}

impl ContinueDialog {
    /// A dialog that has not been shown yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows the dialog and waits for an answer.
    pub fn ask(&mut self) -> Result<bool, GuiError> {
        self.runs += 1;
        let runs = self.runs;

        with_screen(|terminal| loop {
            let title = Title::from(Span::from(format!(" Run {runs} finished ")).magenta().bold());
            let instructions = Title::from(Line::from(vec![
                " Continue ".into(),
                "<Y>/<Enter>".magenta().bold(),
                " Stop ".into(),
                "<N>/<Q>/<Esc> ".magenta().bold(),
            ]));
            let block = Block::default()
                .title(title.alignment(Alignment::Center))
                .title(
                    instructions
                        .alignment(Alignment::Center)
                        .position(Position::Bottom),
                )
                .borders(Borders::ALL);
            let text = Paragraph::new(Line::from(vec![
                " Recalibrate and start another run? ".into(),
                "Keep the fingertip unloaded while calibrating. ".italic(),
            ]))
            .block(block);
            terminal.draw(|frame| {
                let area = frame.size();
                frame.render_widget(text, area);
            })?;

            if event::poll(Duration::from_millis(16))? {
                if let event::Event::Key(key) = event::read()? {
                    if let Some(answer) = answer(key) {
                        return Ok(answer);
                    }
                }
            }
        })
    }
}

impl ContinuePrompt for ContinueDialog {
    fn ask_continue(&mut self) -> bool {
        self.ask().unwrap_or_else(|e| {
            error!("continue prompt failed, stopping: {e}");
            false
        })
    }
}

/// Maps a key press to continue (`Some(true)`), stop (`Some(false)`), or
/// no decision.
fn answer(key: KeyEvent) -> Option<bool> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        // raw mode swallows SIGINT, so Ctrl-C arrives as a key
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(false),
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(true),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Char('q') | KeyCode::Esc => {
            Some(false)
        }
        _ => None,
    }
}
