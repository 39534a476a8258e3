//! Boot menu
//!
//! The menu model is backend-agnostic: a list of labelled options, a
//! starting highlight and a countdown. Rendering and key handling are
//! behind [`MenuBackend`] so a graphical frontend can slot in when a
//! usable font is around; the text backend here only needs a
//! [`MenuConsole`].

use alloc::{format, string::String, vec::Vec};

use log::warn;

use steamcl_core::{
    base::Status,
    error::Result,
    proto::{
        ATTR_DEFAULT,
        ATTR_SELECTED,
        ATTR_TITLE,
        CHAR_CARRIAGE_RETURN,
        CHAR_LINEFEED,
        SCAN_DOWN,
        SCAN_ESC,
        SCAN_UP,
    },
};

use crate::{platform::MenuConsole, vars::EntryFlags};

/// Milliseconds between countdown ticks.
const TICK_MS: u64 = 100;

/// One selectable entry.
#[derive(Debug, Clone)]
pub struct MenuOption {
    pub label: String,
    /// One-line description shown in the info frame.
    pub blurb: String,
    /// Index of the candidate this option boots.
    pub candidate: usize,
    /// How to boot it.
    pub bits: EntryFlags,
}

/// A menu ready to display.
#[derive(Debug, Clone, Default)]
pub struct Menu {
    pub title: String,
    pub options: Vec<MenuOption>,
}

/// How a menu run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    /// The highlighted option was accepted.
    Chosen(usize),
    /// Esc: leave the menu without choosing.
    Cancelled,
    /// The countdown ran out; the highlighted option applies.
    TimedOut(usize),
}

/// A rendering/input engine for menus.
pub trait MenuBackend {
    /// Display `menu` with the highlight on `start`; `timeout_secs`
    /// of 0 disables the countdown. Returns the outcome plus how long
    /// the menu was up, in milliseconds of wait ticks.
    fn run(&mut self, menu: &Menu, start: usize, timeout_secs: u64)
        -> Result<(MenuOutcome, u64)>;
}

/// Layout of one rendered menu, all in character cells.
struct Layout {
    cols: usize,
    rows: usize,
    x: usize,
    y: usize,
    width: usize,
}

/// The text-console backend.
pub struct TextMenu<'con> {
    con: &'con mut dyn MenuConsole,
}

impl<'con> TextMenu<'con> {
    pub fn new(con: &'con mut dyn MenuConsole) -> Self {
        Self { con }
    }

    fn layout(&mut self, menu: &Menu) -> Layout {
        let (cols, rows) = self.con.size();
        let width = menu.options.iter().map(|o| o.label.len()).max().unwrap_or(0);

        // centre vertically, then horizontally on the widest label
        let y = rows.saturating_sub(menu.options.len()) / 2;
        let mut x = cols / 2;
        for opt in &menu.options {
            let o = (cols.saturating_sub(opt.label.len()) / 2).saturating_sub(2);
            if o < x {
                x = o;
            }
        }

        Layout {
            cols,
            rows,
            x,
            y,
            width,
        }
    }

    fn render_option(&mut self, menu: &Menu, l: &Layout, nth: usize, on: bool) {
        let opt = &menu.options[nth];
        self.con
            .set_attr(if on { ATTR_SELECTED } else { ATTR_DEFAULT });
        self.con.set_cursor(l.x, l.y + nth);
        self.con.write(if on { "> " } else { "  " });
        self.con.write(&opt.label);
        for _ in opt.label.len()..l.width {
            self.con.write(" ");
        }
        self.con.write(if on { " <" } else { "  " });

        if on {
            self.render_blurb(menu, l, nth);
        }
    }

    /// A one-line framed info area pinned to the bottom of the screen.
    fn render_blurb(&mut self, menu: &Menu, l: &Layout, nth: usize) {
        if l.rows < 4 || l.cols < 8 {
            return;
        }
        let inner = l.cols.saturating_sub(4);
        let mut bar = String::with_capacity(inner + 2);
        bar.push('+');
        for _ in 0..inner {
            bar.push('-');
        }
        bar.push('+');

        self.con.set_attr(ATTR_DEFAULT);
        self.con.set_cursor(1, l.rows - 3);
        self.con.write(&bar);
        self.con.set_cursor(1, l.rows - 1);
        self.con.write(&bar);

        let mut line = String::with_capacity(inner + 2);
        line.push('|');
        let blurb: String = menu.options[nth].blurb.chars().take(inner - 2).collect();
        line.push(' ');
        line.push_str(&blurb);
        for _ in blurb.len()..inner - 1 {
            line.push(' ');
        }
        line.push('|');
        self.con.set_cursor(1, l.rows - 2);
        self.con.write(&line);
    }

    fn render(&mut self, menu: &Menu, l: &Layout, selected: usize) {
        if l.y >= 1 && !menu.title.is_empty() {
            let t_x = l.x + 2 + (l.width.saturating_sub(menu.title.len()) / 2);
            self.con.set_cursor(t_x, l.y - 1);
            self.con.set_attr(ATTR_TITLE);
            self.con.write(&menu.title);
        }
        for i in 0..menu.options.len() {
            self.render_option(menu, l, i, i == selected);
        }
    }

    fn render_countdown(&mut self, l: &Layout, menu: &Menu, remaining: Option<u64>) {
        let row = l.y + menu.options.len() + 1;
        if row >= l.rows.saturating_sub(3) {
            return;
        }
        self.con.set_attr(ATTR_DEFAULT);
        self.con.set_cursor(l.x, row);
        match remaining {
            Some(secs) => {
                let text = format!("Booting in {}   ", format_interval(secs));
                self.con.write(&text);
            }
            None => {
                // countdown frozen or absent: blank the line
                let blank: String = core::iter::repeat(' ').take(l.width + 16).collect();
                self.con.write(&blank);
            }
        }
    }
}

impl<'con> MenuBackend for TextMenu<'con> {
    fn run(
        &mut self,
        menu: &Menu,
        start: usize,
        timeout_secs: u64,
    ) -> Result<(MenuOutcome, u64)> {
        let l = self.layout(menu);
        self.con.clear();
        self.con.show_cursor(false);

        let mut selected = if start >= menu.options.len() {
            0
        } else {
            start
        };
        self.render(menu, &l, selected);

        let mut remaining = timeout_secs;
        let mut counting = timeout_secs > 0;
        let mut ticks: u64 = 0;
        if counting {
            self.render_countdown(&l, menu, Some(remaining));
        }

        let outcome = loop {
            let key = match self.con.wait_key(TICK_MS) {
                Ok(key) => key,
                Err(e) if e.status() == Status::TIMEOUT => {
                    ticks += 1;
                    if counting && ticks % (1000 / TICK_MS) == 0 {
                        remaining = remaining.saturating_sub(1);
                        self.render_countdown(&l, menu, Some(remaining));
                        if remaining == 0 {
                            break MenuOutcome::TimedOut(selected);
                        }
                    }
                    continue;
                }
                Err(e) => {
                    // console went away; boot what we have
                    warn!("menu input failed: {e}");
                    break MenuOutcome::Chosen(selected);
                }
            };

            // any keypress freezes the countdown
            if counting {
                counting = false;
                self.render_countdown(&l, menu, None);
            }

            if key.unicode == CHAR_LINEFEED || key.unicode == CHAR_CARRIAGE_RETURN {
                break MenuOutcome::Chosen(selected);
            }
            if key.scan == SCAN_ESC && key.unicode == 0 {
                break MenuOutcome::Cancelled;
            }

            let old = selected;
            if key.scan == SCAN_UP {
                selected = selected.saturating_sub(1);
            } else if key.scan == SCAN_DOWN {
                // wrap to the top off the end of the list
                selected = if selected + 1 < menu.options.len() {
                    selected + 1
                } else {
                    0
                };
            }
            if selected != old {
                self.render_option(menu, &l, old, false);
                self.render_option(menu, &l, selected, true);
            }
        };

        self.con.set_attr(ATTR_DEFAULT);
        self.con.clear();
        Ok((outcome, ticks * TICK_MS))
    }
}

/// Yes/no prompt, used to gate the factory-reset option. Enter takes the
/// default; Esc always declines.
pub fn confirm(con: &mut dyn MenuConsole, question: &str, default_answer: bool) -> bool {
    con.set_attr(ATTR_DEFAULT);
    con.write(question);
    con.write(if default_answer { " [Y/n] " } else { " [y/N] " });
    loop {
        let key = match con.wait_key(0) {
            Ok(key) => key,
            Err(_) => return false,
        };
        match key.unicode {
            u if u == CHAR_LINEFEED || u == CHAR_CARRIAGE_RETURN => return default_answer,
            u if u == b'y' as u16 || u == b'Y' as u16 => return true,
            u if u == b'n' as u16 || u == b'N' as u16 => return false,
            _ => {
                if key.scan == SCAN_ESC {
                    return false;
                }
            }
        }
    }
}

/// `M:SS` countdown label.
pub fn format_interval(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_formatting() {
        assert_eq!(format_interval(0), "0:00");
        assert_eq!(format_interval(30), "0:30");
        assert_eq!(format_interval(120), "2:00");
        assert_eq!(format_interval(125), "2:05");
    }

    #[test]
    fn outcome_is_comparable() {
        assert_eq!(MenuOutcome::Chosen(1), MenuOutcome::Chosen(1));
        assert_ne!(MenuOutcome::Cancelled, MenuOutcome::TimedOut(0));
    }
}
