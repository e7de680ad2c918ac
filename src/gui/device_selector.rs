use std::{path::PathBuf, time::Duration};

use crate::gui::{error::GuiError, with_screen};

use crossterm::event::{self, KeyCode, KeyEventKind};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
};

/// Lets the operator pick the force/torque sensor's serial port from
/// `available_ports`. `None` means they quit without choosing.
pub fn device_selector(mut available_ports: Vec<PathBuf>) -> Result<Option<PathBuf>, GuiError> {
    let n_ports = available_ports.len();
    if n_ports == 0 {
        return Err(GuiError::NothingToSelect);
    }

    let selected_port = with_screen(|terminal| {
        let mut cursor = 0;
        let mut list_state = ListState::default().with_selected(Some(cursor));
        loop {
            let title = Title::from(" Force/Torque Sensor Port ".magenta().bold());
            let instructions = Title::from(Line::from(vec![
                " Navigate ".into(),
                "<Up>/<Down>".magenta().bold(),
                " Select ".into(),
                "<Enter>".magenta().bold(),
                " Quit ".into(),
                "<Q> ".magenta().bold(),
            ]));
            let block = Block::default()
                .title(title.alignment(Alignment::Center))
                .title(
                    instructions
                        .alignment(Alignment::Center)
                        .position(Position::Bottom),
                )
                .borders(Borders::ALL);
            let port_names = available_ports.iter().map(|p| p.to_string_lossy());
            let list = List::new(port_names)
                .style(Style::default().fg(Color::White))
                .highlight_symbol(">>")
                .highlight_style(Style::default().fg(Color::Magenta))
                .block(block);
            list_state.select(Some(cursor));
            terminal.draw(|frame| {
                let area = frame.size();
                frame.render_stateful_widget(list, area, &mut list_state);
            })?;

            if event::poll(Duration::from_millis(16))? {
                if let event::Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        match key.code {
                            KeyCode::Down => cursor = (cursor + 1) % n_ports,
                            KeyCode::Up => cursor = (cursor + n_ports - 1) % n_ports,
                            KeyCode::Enter => return Ok(Some(cursor)),
                            KeyCode::Char('q') | KeyCode::Esc => return Ok(None),
                            _ => {}
                        }
                    }
                }
            }
        }
    })?;

    Ok(selected_port.map(|i| available_ports.swap_remove(i)))
}
