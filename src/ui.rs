/*
 * This file is part of gknvidia.
 *
 * Copyright (C) 2025 gknvidia contributors
 *
 * gknvidia is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * gknvidia is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with gknvidia. If not, see <https://www.gnu.org/licenses/>.
 */

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph};

use gkn_core::{x_position, Margins, RenderedRow};

use crate::app::{App, Focus};

const PANEL_MARGINS: Margins = Margins { left: 1, right: 1 };

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// One panel row as text `width` columns wide
///
/// The label sits at the left margin and the value at the column
/// [`x_position`] gives for the row's alignment.
pub fn panel_line(row: &RenderedRow, width: usize) -> String {
    let mut cells = vec![' '; width];
    let mut put = |start: i32, text: &str| {
        let len = text.chars().count();
        let start = start.clamp(0, width.saturating_sub(len) as i32) as usize;
        for (cell, c) in cells.iter_mut().skip(start).zip(text.chars()) {
            *cell = c;
        }
    };

    if !row.label.is_empty() {
        put(PANEL_MARGINS.left, row.label);
    }
    let text_width = row.value.chars().count() as i32;
    put(
        x_position(row.alignment, width as i32, PANEL_MARGINS, text_width),
        &row.value,
    );

    cells.into_iter().collect::<String>().trim_end().to_string()
}

/// Panel text, one line per row with a blank line between GPUs
pub fn panel_lines(rows: &[RenderedRow], width: usize) -> Vec<String> {
    let mut lines = Vec::with_capacity(rows.len());
    let mut previous = None;
    for row in rows {
        if previous.is_some_and(|d| d != row.device_index) {
            lines.push(String::new());
        }
        previous = Some(row.device_index);
        lines.push(panel_line(row, width));
    }
    lines
}

fn focus_border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

pub fn ui(f: &mut Frame, app: &App) {
    let size = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(size);
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[0]);

    draw_panel(f, app, columns[0]);
    draw_options(f, app, columns[1]);

    let status_lines = vec![
        Line::from(app.status.as_str()),
        Line::from("Keys: Tab switch focus | ↑/↓ select | Space toggle | Shift+↑/↓ or K/J move | p backend path | r refresh | s save | q quit"),
    ];
    let status = Paragraph::new(status_lines).style(Style::default().fg(Color::Gray));
    f.render_widget(status, chunks[1]);

    if app.show_path_popup {
        draw_path_popup(f, app, size);
    }
    if app.show_confirm_save_popup {
        draw_confirm_save_popup(f, size);
    }
}

fn draw_panel(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(" GPUs ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(focus_border(app.focus == Focus::Panel));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines: Vec<Line> = if app.rows.is_empty() {
        vec![Line::from(Span::styled(
            "No GPUs available",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        panel_lines(&app.rows, inner.width as usize)
            .into_iter()
            .map(Line::from)
            .collect()
    };
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_options(f: &mut Frame, app: &App, area: Rect) {
    let registry = app.plugin.registry();
    let items: Vec<ListItem> = registry
        .current_order()
        .into_iter()
        .map(|kind| {
            let mark = if registry.is_enabled(kind) { "[x]" } else { "[ ]" };
            ListItem::new(format!("{} {}", mark, kind.option_label()))
        })
        .collect();

    let focused = app.focus == Focus::Options;
    let list = List::new(items)
        .block(
            Block::default()
                .title(" Options ")
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(focus_border(focused)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if focused {
        state.select(Some(app.options_idx));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn draw_path_popup(f: &mut Frame, app: &App, size: Rect) {
    let area = centered_rect(60, 30, size);
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(" Backend path ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let verdict = if app.path_valid {
        Span::styled(" ✓", Style::default().fg(Color::Green))
    } else {
        Span::styled(" ✗", Style::default().fg(Color::Red))
    };
    let lines = vec![
        Line::from(format!("Backend: {} (Tab to change)", app.path_kind)),
        Line::from(vec![Span::raw(format!("Path: {}", app.path_input)), verdict]),
        Line::from(""),
        Line::from(Span::styled(
            "Enter apply | Esc cancel | Ctrl+U clear",
            Style::default().fg(Color::Gray),
        )),
    ];
    f.render_widget(Paragraph::new(lines), inner);
}

fn draw_confirm_save_popup(f: &mut Frame, size: Rect) {
    let area = centered_rect(40, 20, size);
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(" Unsaved changes ")
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Yellow));
    let text = vec![
        Line::from("Save changes before quitting?"),
        Line::from(Span::styled(
            "y save | n discard | Esc cancel",
            Style::default().fg(Color::Gray),
        )),
    ];
    f.render_widget(Paragraph::new(text).block(block), area);
}
