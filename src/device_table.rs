use std::io::{self, Write};

use chrono::Local;
use crossterm::{
    queue,
    style::{self, Attribute, ContentStyle, Print, PrintStyledContent, StyledContent},
};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Row, Table, Widget},
};
use unicode_width::UnicodeWidthStr;

use crate::registry::{Device, DeviceClass, Reachability, Registry};

const HEADERS: [&str; 6] = ["#", "Name", "Address", "Status", "Latency", "Description"];

/// One class of devices laid out as a bordered table.
pub struct DeviceTable<'a> {
    class: DeviceClass,
    rows: Vec<(String, &'a Device)>,
    longest_item_lens: [u16; 6],
}

impl<'a> DeviceTable<'a> {
    pub fn new(registry: &'a Registry, class: DeviceClass) -> Self {
        let rows: Vec<_> = registry
            .partition(class)
            .enumerate()
            .map(|(position, (_, device))| (class.label(position), device))
            .collect();

        let mut longest_item_lens = HEADERS.map(|h| UnicodeWidthStr::width(h) as u16);
        for (label, device) in &rows {
            for (len, text) in longest_item_lens.iter_mut().zip(Self::texts(label, device)) {
                *len = (*len).max(UnicodeWidthStr::width(text.as_str()) as u16);
            }
        }

        Self {
            class,
            rows,
            longest_item_lens,
        }
    }

    fn texts(label: &str, device: &Device) -> [String; 6] {
        let latency = device
            .status()
            .latency_ms()
            .map(|ms| format!("{ms:.1} ms"))
            .unwrap_or_else(|| "-".to_string());
        let mut status = device.status().to_string();
        if let Some(at) = device.last_checked() {
            status = format!("{} @{}", status, at.with_timezone(&Local).format("%H:%M:%S"));
        }

        [
            label.to_string(),
            device.name.clone(),
            format!("{}:{}", device.address, device.port),
            status,
            latency,
            device.description.clone().unwrap_or_default(),
        ]
    }

    fn status_color(status: Reachability) -> Color {
        match status {
            Reachability::Online { .. } => Color::Green,
            Reachability::Offline => Color::Red,
            Reachability::Unknown => Color::DarkGray,
        }
    }

    pub fn height(&self) -> u16 {
        self.rows.len() as u16 + 3
    }

    /// Lay the table out into an off-screen buffer `width` columns wide.
    pub fn to_buffer(&self, width: u16) -> Buffer {
        let header = Row::new(HEADERS.map(|h| {
            Cell::from(h).style(Style::default().add_modifier(Modifier::UNDERLINED))
        }))
        .style(Style::default().add_modifier(Modifier::BOLD));

        let rows = self.rows.iter().map(|(label, device)| {
            let [label, name, address, status, latency, description] = Self::texts(label, device);
            Row::new(vec![
                Cell::from(label).style(Style::default().fg(Color::Cyan)),
                Cell::from(name),
                Cell::from(address),
                Cell::from(status)
                    .style(Style::default().fg(Self::status_color(device.status()))),
                Cell::from(latency),
                Cell::from(description),
            ])
        });

        let [label, name, address, status, latency, _] = self.longest_item_lens;
        let table = Table::new(
            rows,
            [
                Constraint::Length(label + 1),
                Constraint::Length(name + 1),
                Constraint::Length(address + 1),
                Constraint::Length(status + 1),
                Constraint::Length(latency + 1),
                Constraint::Min(0),
            ],
        )
        .header(header)
        .block(
            Block::default()
                .title(format!(" {} ", self.class.title()))
                .borders(Borders::ALL),
        );

        let area = Rect::new(0, 0, width, self.height());
        let mut buffer = Buffer::empty(area);
        Widget::render(table, area, &mut buffer);
        buffer
    }
}

/// Print a buffer line by line, keeping colors and bold text.
pub fn write_buffer<W: Write>(out: &mut W, buffer: &Buffer) -> io::Result<()> {
    let area = buffer.area;
    for y in area.top()..area.bottom() {
        let mut runs: Vec<(ContentStyle, String)> = Vec::new();
        for x in area.left()..area.right() {
            let cell = buffer.get(x, y);
            let cell_style = cell.style();
            let style = content_style(
                cell_style.fg.unwrap_or(Color::Reset),
                cell_style.add_modifier,
            );
            match runs.last_mut() {
                Some((last, text)) if *last == style => text.push_str(cell.symbol()),
                _ => runs.push((style, cell.symbol().to_string())),
            }
        }

        while let Some((_, text)) = runs.last_mut() {
            let trimmed = text.trim_end().len();
            text.truncate(trimmed);
            if text.is_empty() {
                runs.pop();
            } else {
                break;
            }
        }

        for (style, text) in runs {
            queue!(out, PrintStyledContent(StyledContent::new(style, text)))?;
        }
        queue!(out, Print("\n"))?;
    }
    out.flush()
}

fn content_style(fg: Color, modifier: Modifier) -> ContentStyle {
    let mut style = ContentStyle::new();
    style.foreground_color = match fg {
        Color::Reset => None,
        Color::Green => Some(style::Color::Green),
        Color::Red => Some(style::Color::Red),
        Color::Cyan => Some(style::Color::Cyan),
        Color::Yellow => Some(style::Color::Yellow),
        Color::DarkGray => Some(style::Color::DarkGrey),
        _ => None,
    };
    if modifier.contains(Modifier::BOLD) {
        style.attributes.set(Attribute::Bold);
    }
    if modifier.contains(Modifier::UNDERLINED) {
        style.attributes.set(Attribute::Underlined);
    }
    style
}
