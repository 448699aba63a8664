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

use std::io::stdout;

use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;

use gknvidia::app::App;
use gknvidia::config::Options;
use gknvidia::events::handle_key_event;
use gknvidia::logger;
use gknvidia::ui::{panel_lines, ui};

const ONCE_PANEL_WIDTH: usize = 40;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let options = Options::parse();

    if options.logging {
        if let Some(path) = logger::init_logging() {
            logger::log_event(
                "startup",
                serde_json::json!({ "args": args, "log": path.display().to_string() }),
            );
        }
    }

    let mut app = App::load(options.settings_path());
    app.refresh_interval = options.interval();
    app.create();

    if options.once {
        return print_once(&app, options.json);
    }

    // Terminal init
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    app.plugin.shutdown();

    if let Err(err) = res {
        eprintln!("error: {err}");
        logger::log_event("fatal_error", serde_json::json!({ "error": err.to_string() }));
        std::process::exit(1);
    }

    Ok(())
}

/// Headless mode: one sample printed to stdout
fn print_once(app: &App, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&app.rows)?);
        return Ok(());
    }
    if app.rows.is_empty() {
        eprintln!("{}", app.status);
        return Ok(());
    }
    for line in panel_lines(&app.rows, ONCE_PANEL_WIDTH) {
        println!("{}", line);
    }
    Ok(())
}

fn run_app(
    terminal: &mut Terminal<ratatui::backend::CrosstermBackend<std::io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let timeout = app
            .refresh_interval
            .saturating_sub(app.last_refresh.elapsed());
        if event::poll(timeout).unwrap_or(false) {
            if let Event::Key(key_event) = event::read()? {
                if key_event.kind == KeyEventKind::Press && handle_key_event(app, key_event)? {
                    return Ok(());
                }
            }
        }

        if app.refresh_due() {
            app.refresh();
        }
    }
}
