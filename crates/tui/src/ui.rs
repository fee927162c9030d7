use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    style::{Color, Style, Modifier},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
};

use autostep_core::types::RunState;
use crate::App;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    // -- Left panel: steps and objects --

    // Run state banner (rendered separately as full-width bar)
    let (banner_label, banner_bg) = match app.run_state {
        RunState::Idle => ("IDLE (Press S to start)".to_string(), Color::Blue),
        RunState::Running => match app.current_loop {
            Some((i, Some(n))) => (format!("RUNNING loop {}/{} (Press S to stop)", i, n), Color::Green),
            Some((i, None)) => (format!("RUNNING loop {} (Press S to stop)", i), Color::Green),
            None => ("RUNNING (Press S to stop)".to_string(), Color::Green),
        },
        RunState::Aborting => ("ABORTING...".to_string(), Color::Yellow),
        RunState::Stopped => ("STOPPED (Press S to start)".to_string(), Color::Red),
    };

    let mut lines: Vec<Line> = Vec::new();

    // Help line as first content line inside the bordered panel
    lines.push(Line::from(vec![
        Span::styled(" j", Style::default().fg(Color::Yellow)),
        Span::raw("/"),
        Span::styled("k", Style::default().fg(Color::Yellow)),
        Span::raw(" select, "),
        Span::styled("J", Style::default().fg(Color::Yellow)),
        Span::raw("/"),
        Span::styled("K", Style::default().fg(Color::Yellow)),
        Span::raw(" move, "),
        Span::styled("d", Style::default().fg(Color::Yellow)),
        Span::raw(" delete, "),
        Span::styled("w", Style::default().fg(Color::Yellow)),
        Span::raw(" save"),
    ]));
    lines.push(Line::from(""));

    if let Ok(seq) = app.sequence.lock() {
        let modified = if seq.is_modified() { " *" } else { "" };
        let watch = if app.watch_mode { "  [watch]" } else { "" };
        let loops = match seq.loop_count() {
            0 => "forever".to_string(),
            n => format!("x{}", n),
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!(" {}{}", seq.name(), modified),
                Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
            ),
            Span::styled(format!("  loops {}", loops), Style::default().fg(Color::DarkGray)),
            Span::styled(watch, Style::default().fg(Color::Cyan)),
        ]));

        // Positions are recomputed from the current order on every draw.
        for (position, step) in seq.steps().positions() {
            let is_selected = position - 1 == app.selected;
            let is_current = app.current_step == Some(position);
            let prefix = if is_selected { "> " } else { "  " };
            let marker = if is_current { "▶" } else { " " };

            let mut spans = vec![
                Span::raw(prefix),
                Span::styled(marker, Style::default().fg(banner_bg)),
                Span::styled(format!("{:>3}. ", position), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    step.action.name(),
                    Style::default().fg(if step.action.is_control() { Color::Magenta } else { Color::White }),
                ),
            ];
            if let Some(name) = &step.object {
                if seq.objects().contains(name) {
                    spans.push(Span::styled(format!(" {}", name), Style::default().fg(Color::Cyan)));
                } else {
                    spans.push(Span::styled(format!(" {} (missing)", name), Style::default().fg(Color::Red)));
                }
            }
            spans.push(Span::styled(
                format!("  {}", step.action.summary()),
                Style::default().fg(Color::DarkGray),
            ));
            lines.push(Line::from(spans));
        }

        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(" Objects ({})", seq.objects().len()),
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )));
        for (name, obj) in seq.objects().iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("    {}", name), Style::default().fg(Color::Yellow)),
                Span::styled(format!("  {}", obj.describe()), Style::default().fg(Color::DarkGray)),
            ]));
        }
    } // sequence lock dropped here

    // Split left panel into banner (1 line) + step list (fills space)
    let left_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);

    // Full-width centered banner
    let banner_width = left_chunks[0].width as usize;
    let pad_total = banner_width.saturating_sub(banner_label.len());
    let pad_left = pad_total / 2;
    let pad_right = pad_total - pad_left;
    let centered_banner = format!("{}{}{}", " ".repeat(pad_left), banner_label, " ".repeat(pad_right));
    let banner = Paragraph::new(Line::from(Span::styled(
        centered_banner,
        Style::default().fg(Color::Black).bg(banner_bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, left_chunks[0]);

    let step_list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(step_list, left_chunks[1]);

    // -- Right panel: logs --
    if app.log_visible && chunks.len() > 1 {
        let visible_height = chunks[1].height.saturating_sub(2) as usize;
        let total = app.log_messages.len();
        let max_scroll = total.saturating_sub(visible_height);
        let scroll = app.log_scroll.min(max_scroll);
        let start = total.saturating_sub(visible_height + scroll);
        let end = total.saturating_sub(scroll);
        let log_lines: Vec<Line> = app.log_messages[start..end]
            .iter()
            .map(|m| parse_log_line(m))
            .collect();

        let log_panel = Paragraph::new(log_lines)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(" Logs ")
                    .border_style(Style::default().fg(Color::Yellow)),
            )
            .wrap(Wrap { trim: false });
        f.render_widget(log_panel, chunks[1]);
    }

    if let Some((dialog, _)) = &app.confirm {
        dialog.render(f);
    }
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line for TUI rendering.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    if parts.len() < 5 {
        // Fallback for unstructured messages
        return Line::from(raw);
    }

    let level = parts[0];
    let prefix = parts[1];
    let color_idx: u8 = parts[2].parse().unwrap_or(0);
    let timestamp = parts[3];
    let message = parts[4];

    let prefix_color = match color_idx {
        1 => Color::DarkGray,  // COLOR_GRAY
        2 => Color::LightBlue, // COLOR_BLUE
        _ => Color::White,
    };

    let msg_color = prefix_color;

    let mut spans = Vec::new();

    // Dim timestamp (no brackets)
    spans.push(Span::styled(
        timestamp,
        Style::default().fg(Color::DarkGray),
    ));
    spans.push(Span::raw(" "));

    // Level tag: only show for warn/error, colored (overrides line color)
    match level {
        "ERROR" => {
            spans.push(Span::styled("error ", Style::default().fg(Color::Red)));
        }
        "WARN" => {
            spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow)));
        }
        _ => {} // INFO: no tag
    }

    // Prefix (bold to distinguish from message)
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(prefix_color).add_modifier(Modifier::BOLD)));
        spans.push(Span::styled(" ", Style::default().fg(msg_color)));
    }

    // Message in same color as prefix (default line color)
    spans.push(Span::styled(message, Style::default().fg(msg_color)));

    Line::from(spans)
}
