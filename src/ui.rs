use crate::app::{App, LEGEND_WIDTH};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Widget},
    Frame,
};
use transit_access::braille::BrailleCanvas;
use transit_access::data::DatasetKind;
use transit_access::map::Label;
use transit_access::style::{Rgba, LEGEND_TITLE};
use transit_access::tooltip::Tooltip;

fn rgb(color: [u8; 3]) -> Color {
    Color::Rgb(color[0], color[1], color[2])
}

fn rgba(color: Rgba) -> Color {
    Color::Rgb(color[0], color[1], color[2])
}

/// Render the UI
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    // Split into main area and status bar
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(3),    // Map + legend
            Constraint::Length(1), // Status bar
        ])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(10), Constraint::Length(LEGEND_WIDTH as u16)])
        .split(rows[0]);

    render_map(frame, app, columns[0]);
    render_legend(frame, app, columns[1]);
    render_status_bar(frame, app, rows[1]);
}

fn render_map(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            " Shenzhen Transit Accessibility ",
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    // Braille gives 2x4 resolution per character
    let mut viewport = app.viewport.clone();
    viewport.width = inner.width as usize * 2;
    viewport.height = inner.height as usize * 4;

    let mut canvas = BrailleCanvas::new(inner.width as usize, inner.height as usize);
    let (labels, background) = match app.store.surface() {
        Some(surface) => (
            surface.render(&mut canvas, &viewport, app.hover),
            surface.basemap().background(),
        ),
        None => (Vec::new(), [0, 0, 0]),
    };

    let cursor_pos = app.mouse_pixel_pos().and_then(|(px, py)| {
        let cx = (px / 2) as u16;
        let cy = (py / 4) as u16;
        (cx < inner.width && cy < inner.height).then_some((cx, cy))
    });

    frame.render_widget(
        MapWidget {
            canvas,
            labels,
            cursor_pos,
            background: rgb(background),
        },
        inner,
    );

    if let (Some(tooltip), Some((cx, cy))) = (&app.tooltip, cursor_pos) {
        render_tooltip(frame, tooltip, inner, cx, cy);
    }
}

/// Braille map with text labels overlaid
struct MapWidget {
    canvas: BrailleCanvas,
    labels: Vec<Label>,
    cursor_pos: Option<(u16, u16)>,
    background: Color,
}

impl Widget for MapWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let label_style = Style::default().fg(Color::White).bg(self.background);

        for row in 0..area.height {
            for col in 0..area.width {
                let cell = &mut buf[(area.x + col, area.y + row)];
                cell.set_bg(self.background);
                if let Some((ch, color)) = self.canvas.cell(col as usize, row as usize) {
                    cell.set_char(ch).set_fg(rgb(color));
                }
            }
        }

        for (lx, ly, text) in &self.labels {
            if *ly >= area.height || *lx >= area.width {
                continue;
            }
            let max_len = (area.width - *lx) as usize;
            let display: String = text.chars().take(max_len.min(24)).collect();
            buf.set_string(area.x + *lx, area.y + *ly, display, label_style);
        }

        if let Some((cx, cy)) = self.cursor_pos {
            buf[(area.x + cx, area.y + cy)].set_char('╋').set_fg(Color::Red);
        }
    }
}

fn render_tooltip(frame: &mut Frame, tooltip: &Tooltip, bounds: Rect, cx: u16, cy: u16) {
    let width = tooltip
        .lines
        .iter()
        .map(|l| l.chars().count())
        .chain(std::iter::once(tooltip.title.chars().count()))
        .max()
        .unwrap_or(0) as u16
        + 4;
    let height = tooltip.lines.len() as u16 + 2;
    if width > bounds.width || height > bounds.height {
        return;
    }

    // Prefer below-right of the cursor, flip when it would leave the pane
    let mut x = bounds.x + cx + 2;
    if x + width > bounds.x + bounds.width {
        x = (bounds.x + cx).saturating_sub(width + 1).max(bounds.x);
    }
    let mut y = bounds.y + cy + 1;
    if y + height > bounds.y + bounds.height {
        y = (bounds.y + cy).saturating_sub(height).max(bounds.y);
    }
    let rect = Rect::new(x, y, width, height);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(Span::styled(
            format!(" {} ", tooltip.title),
            Style::default().add_modifier(Modifier::BOLD),
        ));
    let text: Vec<Line> = tooltip.lines.iter().map(|l| Line::from(l.as_str())).collect();
    frame.render_widget(Clear, rect);
    frame.render_widget(Paragraph::new(text).block(block), rect);
}

fn render_legend(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Span::styled(
            format!(" {LEGEND_TITLE} "),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));

    let dim = Style::default().fg(Color::DarkGray);
    let mut lines: Vec<Line> = app
        .store
        .legend()
        .into_iter()
        .map(|entry| {
            Line::from(vec![
                Span::styled("██ ", Style::default().fg(rgba(entry.color))),
                Span::raw(entry.label),
            ])
        })
        .collect();

    lines.push(Line::raw(""));
    let visibility = app.store.interaction().visibility;
    for (key, name, kind) in [
        ("a", "Accessibility", DatasetKind::Cells),
        ("s", "Stations", DatasetKind::Stations),
        ("t", "Lines", DatasetKind::Lines),
    ] {
        let on = visibility.get(kind);
        let status = if !app.store.has_dataset(kind) {
            Span::styled(" (no data)", dim)
        } else {
            Span::raw("")
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("[{}] {key} {name}", if on { "x" } else { " " }),
                Style::default().fg(if on { Color::Green } else { Color::DarkGray }),
            ),
            status,
        ]));
    }

    lines.push(Line::raw(""));
    for help in [
        "[ ]  extrusion",
        ", .  resolution",
        "m    basemap",
        "p P  pitch   < > bearing",
        "click line: highlight",
        "c/Esc clear  q quit",
    ] {
        lines.push(Line::styled(help, dim));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let interaction = app.store.interaction();
    let sep = Span::styled(" | ", Style::default().fg(Color::DarkGray));

    let mut spans = vec![
        Span::styled(" Extrusion: ", Style::default().fg(Color::DarkGray)),
        Span::styled(app.multiplier_label(), Style::default().fg(Color::Yellow)),
        sep.clone(),
        Span::styled(
            format!("Res {}", interaction.active_resolution),
            Style::default().fg(Color::Magenta),
        ),
        sep.clone(),
        Span::styled(app.basemap().label(), Style::default().fg(Color::Cyan)),
        sep.clone(),
        Span::styled(app.zoom_level(), Style::default().fg(Color::Yellow)),
        Span::raw(" "),
        Span::styled(app.center_coords(), Style::default().fg(Color::Cyan)),
    ];

    if let Some(line) = &interaction.highlighted_line {
        spans.push(sep.clone());
        spans.push(Span::styled(
            format!("Highlight: {line}"),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }
    if app.is_loading() {
        spans.push(sep);
        spans.push(Span::styled("loading…", Style::default().fg(Color::LightRed)));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
