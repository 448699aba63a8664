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

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::{App, Focus};

/// Process one key press; returns `true` when the app should quit
pub fn handle_key_event(app: &mut App, key_event: KeyEvent) -> anyhow::Result<bool> {
    let KeyEvent { code, modifiers, .. } = key_event;

    if code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL) {
        return Ok(true);
    }

    if app.show_confirm_save_popup {
        return Ok(handle_confirm_save_popup(app, code));
    }

    if app.show_path_popup {
        handle_path_popup(app, code, modifiers);
        return Ok(false);
    }

    if app.focus == Focus::Options && handle_options_events(app, code, modifiers) {
        return Ok(false);
    }

    Ok(handle_global_events(app, code))
}

fn handle_confirm_save_popup(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('y') | KeyCode::Enter => app.save(),
        KeyCode::Char('n') => true,
        KeyCode::Esc => {
            app.show_confirm_save_popup = false;
            false
        }
        _ => false,
    }
}

fn handle_path_popup(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
    match code {
        KeyCode::Esc => app.close_path_popup(),
        KeyCode::Enter => app.apply_path(),
        KeyCode::Tab => app.cycle_path_kind(),
        KeyCode::Backspace => app.path_pop(),
        KeyCode::Char('u') if modifiers.contains(KeyModifiers::CONTROL) => app.path_clear(),
        KeyCode::Char(c) if !modifiers.contains(KeyModifiers::CONTROL) => app.path_push(c),
        _ => {}
    }
}

/// Options list navigation; returns whether the key was consumed
fn handle_options_events(app: &mut App, code: KeyCode, modifiers: KeyModifiers) -> bool {
    let shift = modifiers.contains(KeyModifiers::SHIFT);
    match code {
        KeyCode::Up if shift => app.move_selected(true),
        KeyCode::Down if shift => app.move_selected(false),
        KeyCode::Char('K') => app.move_selected(true),
        KeyCode::Char('J') => app.move_selected(false),
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Char(' ') | KeyCode::Enter => app.toggle_selected(),
        _ => return false,
    }
    true
}

fn handle_global_events(app: &mut App, code: KeyCode) -> bool {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => {
            if app.dirty {
                app.show_confirm_save_popup = true;
                return false;
            }
            return true;
        }
        KeyCode::Tab => app.toggle_focus(),
        KeyCode::Char('r') => app.refresh(),
        KeyCode::Char('s') => {
            app.save();
        }
        KeyCode::Char('p') => app.open_path_popup(),
        _ => {}
    }
    false
}
