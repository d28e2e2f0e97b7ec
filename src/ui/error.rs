//! Full-screen notice for failures raised while a screen is open.

use ratatui::{
    prelude::*,
    widgets::{Paragraph, Wrap},
};

const NOTICE_BG: Color = Color::Rgb(255, 0, 0);
const NOTICE_FG: Color = Color::Rgb(255, 255, 255);

/// Paints the whole frame red with `message` centred in white.
///
/// Text wraps to 80% of the screen width.
pub fn draw_notice(frame: &mut Frame, message: &str) {
    let area = frame.area();

    for y in area.y..area.y + area.height {
        for x in area.x..area.x + area.width {
            frame
                .buffer_mut()
                .set_string(x, y, " ", Style::default().bg(NOTICE_BG));
        }
    }

    let padding_x = area.width / 10;
    let text_width = (area.width * 80) / 100;

    let text = Text::from(vec![
        Line::from(Span::styled(
            message,
            Style::default().fg(NOTICE_FG).bg(NOTICE_BG),
        )),
        Line::default(),
        Line::from(Span::styled(
            "press any key",
            Style::default().fg(NOTICE_FG).bg(NOTICE_BG).dim(),
        )),
    ]);

    let paragraph = Paragraph::new(text)
        .style(Style::default().bg(NOTICE_BG))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });

    let centered_area = Rect {
        x: area.x + padding_x,
        y: area.y + area.height / 2,
        width: text_width,
        height: area.height - area.height / 2,
    };

    frame.render_widget(paragraph, centered_area);
}
