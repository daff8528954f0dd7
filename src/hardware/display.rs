use std::io::{self, Stdout};

use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::{Terminal, TerminalOptions, Viewport};

use crate::error::{Capability, HardwareError};

use super::{HwResult, StatusDisplay};

/// Renders the status lines as a bordered panel on a terminal.
///
/// Lines are buffered by `write_line` and drawn together on `flush`.
pub struct TerminalDisplay<B: Backend> {
    terminal: Terminal<B>,
    lines: Vec<String>,
}

impl TerminalDisplay<CrosstermBackend<Stdout>> {
    /// Inline panel below the current cursor position on stdout.
    pub fn stdout(lines: usize) -> HwResult<Self> {
        let height = u16::try_from(lines + 2).unwrap_or(u16::MAX);
        let terminal = Terminal::with_options(
            CrosstermBackend::new(io::stdout()),
            TerminalOptions {
                viewport: Viewport::Inline(height),
            },
        )?;
        Ok(Self::with_terminal(terminal, lines))
    }
}

impl<B: Backend> TerminalDisplay<B> {
    pub fn with_terminal(terminal: Terminal<B>, lines: usize) -> Self {
        Self {
            terminal,
            lines: vec![String::new(); lines],
        }
    }

    pub fn terminal(&self) -> &Terminal<B> {
        &self.terminal
    }
}

impl<B: Backend + Send> StatusDisplay for TerminalDisplay<B> {
    fn clear(&mut self) -> HwResult<()> {
        self.lines.iter_mut().for_each(String::clear);
        self.terminal.clear()?;
        Ok(())
    }

    fn write_line(&mut self, line: usize, text: &str) -> HwResult<()> {
        let slot = self
            .lines
            .get_mut(line)
            .ok_or_else(|| HardwareError::driver(Capability::Display, format!("no line {line}")))?;
        *slot = text.to_string();
        Ok(())
    }

    fn flush(&mut self) -> HwResult<()> {
        let lines: Vec<Line> = self
            .lines
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let style = if i == 0 {
                    Style::default().add_modifier(Modifier::BOLD)
                } else {
                    Style::default()
                };
                Line::styled(text.clone(), style)
            })
            .collect();

        self.terminal.draw(|frame| {
            let block = Block::default()
                .title(" js8d ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan));
            frame.render_widget(Paragraph::new(lines).block(block), frame.area());
        })?;
        Ok(())
    }

    fn lines(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;

    fn row(display: &TerminalDisplay<TestBackend>, y: u16) -> String {
        let buffer = display.terminal().backend().buffer();
        (0..buffer.area.width)
            .filter_map(|x| buffer.cell((x, y)).map(|c| c.symbol().to_string()))
            .collect()
    }

    #[test]
    fn test_flush_renders_lines() {
        let terminal = Terminal::new(TestBackend::new(30, 5)).unwrap();
        let mut display = TerminalDisplay::with_terminal(terminal, 3);
        display.write_line(0, "N0CALL EM12").unwrap();
        display.write_line(1, "RX 14.078000").unwrap();
        display.flush().unwrap();

        assert!(row(&display, 0).contains("js8d"));
        assert!(row(&display, 1).contains("N0CALL EM12"));
        assert!(row(&display, 2).contains("RX 14.078000"));
    }

    #[test]
    fn test_out_of_range_line() {
        let terminal = Terminal::new(TestBackend::new(20, 4)).unwrap();
        let mut display = TerminalDisplay::with_terminal(terminal, 2);
        assert!(matches!(
            display.write_line(2, "x"),
            Err(HardwareError::Driver { capability: Capability::Display, .. })
        ));
    }
}
