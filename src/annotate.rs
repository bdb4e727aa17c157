use crate::frame::{Frame, Rgb, GREEN, RED};
use crate::locus::{BoundingBox, Locus};

pub const MARKER_RADIUS: i32 = 2;
pub const FAILURE_MESSAGE: &str = "TRACKING FAILURE";
/// Baseline-left corner of the failure message, moved inwards on small frames
pub const FAILURE_ORIGIN: (i32, i32) = (100, 80);
const FONT_SCALE: i32 = 2;
const GLYPH_W: i32 = 5;
const GLYPH_H: i32 = 7;

/// What to draw on an output frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mark {
    Position(Locus),
    Failure,
}

pub fn annotate(frame: &mut Frame, mark: &Mark) {
    match mark {
        Mark::Position(locus) => {
            let (x, y) = marker_center(locus);
            draw_point(frame, x, y, GREEN);
            if let Locus::Box(bbox) = locus {
                draw_bbox(frame, bbox, GREEN);
            }
        }
        Mark::Failure => draw_failure(frame),
    }
}

/// Pixel receiving the position marker
pub fn marker_center(locus: &Locus) -> (i32, i32) {
    let p = locus.position();
    (p.x.round() as i32, p.y.round() as i32)
}

/// Filled disc
pub fn draw_point(frame: &mut Frame, x: i32, y: i32, color: Rgb) {
    let r = MARKER_RADIUS;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                frame.put_pixel(x.saturating_add(dx), y.saturating_add(dy), color);
            }
        }
    }
}

/// One pixel outline from (x, y) to (x + w, y + h), coordinates truncated.
/// Only the part of each edge inside the frame is visited.
pub fn draw_bbox(frame: &mut Frame, bbox: &BoundingBox, color: Rgb) {
    let (w, h) = (frame.width as i64, frame.height as i64);
    let x0 = bbox.x as i64;
    let y0 = bbox.y as i64;
    let x1 = x0.saturating_add(bbox.width as i64);
    let y1 = y0.saturating_add(bbox.height as i64);
    for y in [y0, y1] {
        if (0..h).contains(&y) {
            for x in x0.max(0)..=x1.min(w - 1) {
                frame.put_pixel(x as i32, y as i32, color);
            }
        }
    }
    for x in [x0, x1] {
        if (0..w).contains(&x) {
            for y in y0.max(0)..=y1.min(h - 1) {
                frame.put_pixel(x as i32, y as i32, color);
            }
        }
    }
}

pub fn draw_failure(frame: &mut Frame) {
    let (x, y) = failure_origin(frame);
    draw_text(frame, FAILURE_MESSAGE, x, y, RED);
}

/// Top-left corner of the failure message on this frame
pub fn failure_origin(frame: &Frame) -> (i32, i32) {
    let text_w = text_width(FAILURE_MESSAGE);
    let text_h = GLYPH_H * FONT_SCALE;
    let x = FAILURE_ORIGIN.0.min(frame.width as i32 - text_w).max(0);
    let y = (FAILURE_ORIGIN.1 - text_h)
        .min(frame.height as i32 - text_h)
        .max(0);
    (x, y)
}

fn text_width(text: &str) -> i32 {
    let n = text.chars().count() as i32;
    (n * (GLYPH_W + 1) - 1) * FONT_SCALE
}

/// Draw `text` with its top-left corner at (x, y). Characters without a glyph are left blank.
pub fn draw_text(frame: &mut Frame, text: &str, x: i32, y: i32, color: Rgb) {
    for (i, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c) else {
            continue;
        };
        let gx = x + i as i32 * (GLYPH_W + 1) * FONT_SCALE;
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (1 << (GLYPH_W - 1 - col)) == 0 {
                    continue;
                }
                for sy in 0..FONT_SCALE {
                    for sx in 0..FONT_SCALE {
                        frame.put_pixel(
                            gx + col * FONT_SCALE + sx,
                            y + row as i32 * FONT_SCALE + sy,
                            color,
                        );
                    }
                }
            }
        }
    }
}

/// 5x7 bitmaps, one byte per row, the low five bits left to right
fn glyph(c: char) -> Option<[u8; 7]> {
    Some(match c.to_ascii_uppercase() {
        'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'C' => [0x0e, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0e],
        'E' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x1f],
        'F' => [0x1f, 0x10, 0x10, 0x1e, 0x10, 0x10, 0x10],
        'G' => [0x0e, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0f],
        'I' => [0x0e, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'R' => [0x1e, 0x11, 0x11, 0x1e, 0x14, 0x12, 0x11],
        'T' => [0x1f, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        _ => return None,
    })
}

/// True when the frame carries the failure message
pub fn has_failure_mark(frame: &Frame) -> bool {
    let mut reference = Frame::filled(frame.width, frame.height, [0, 0, 0]);
    draw_failure(&mut reference);
    let mut any = false;
    for y in 0..frame.height {
        for x in 0..frame.width {
            if reference.pixel(x, y) == RED {
                if frame.pixel(x, y) != RED {
                    return false;
                }
                any = true;
            }
        }
    }
    any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::my_types::Vector2d;

    fn count(frame: &Frame, color: Rgb) -> usize {
        frame.data.chunks_exact(3).filter(|p| *p == color).count()
    }

    #[test]
    fn test_point_marker() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0]);
        annotate(&mut frame, &Mark::Position(Locus::point(5.4, 9.6).unwrap()));
        assert_eq!(frame.pixel(5, 10), GREEN);
        // radius 2 disc: 13 pixels
        assert_eq!(count(&frame, GREEN), 13);
        assert!(!has_failure_mark(&frame));
    }

    #[test]
    fn test_box_marker_and_outline() {
        let mut frame = Frame::filled(80, 100, [0, 0, 0]);
        let locus = Locus::bbox(10., 20., 40., 60.).unwrap();
        annotate(&mut frame, &Mark::Position(locus));
        assert_eq!(marker_center(&locus), (30, 50));
        assert_eq!(frame.pixel(30, 50), GREEN);
        for (x, y) in [(10, 20), (50, 20), (10, 80), (50, 80), (30, 20), (10, 50)] {
            assert_eq!(frame.pixel(x, y), GREEN, "outline at ({x}, {y})");
        }
        assert_eq!(frame.pixel(20, 30), [0, 0, 0]);
    }

    #[test]
    fn test_failure_message() {
        let mut frame = Frame::filled(320, 240, [0, 0, 0]);
        annotate(&mut frame, &Mark::Failure);
        assert!(has_failure_mark(&frame));
        assert_eq!(count(&frame, GREEN), 0);
        assert_eq!(failure_origin(&frame), (100, 66));
        // the T's top bar starts at the origin
        assert_eq!(frame.pixel(100, 66), RED);
    }

    #[test]
    fn test_failure_message_fits_small_frames() {
        let mut frame = Frame::filled(64, 48, [0, 0, 0]);
        draw_failure(&mut frame);
        assert!(has_failure_mark(&frame));
        assert_eq!(failure_origin(&frame), (0, 34));
    }

    #[test]
    fn test_markers_out_of_frame_are_clipped() {
        let mut frame = Frame::filled(10, 10, [0, 0, 0]);
        annotate(&mut frame, &Mark::Position(Locus::point(-50., 3.).unwrap()));
        assert_eq!(count(&frame, GREEN), 0);
    }

    #[test]
    fn test_far_away_locus_leaves_frame_untouched() {
        let mut frame = Frame::filled(32, 32, [0, 0, 0]);
        annotate(&mut frame, &Mark::Position(Locus::point(3e9, 10.).unwrap()));
        annotate(&mut frame, &Mark::Position(Locus::point(-3e9, -3e9).unwrap()));
        annotate(&mut frame, &Mark::Position(Locus::bbox(3e9, 10., 10., 10.).unwrap()));
        assert_eq!(count(&frame, GREEN), 0);
    }

    #[test]
    fn test_huge_box_is_clipped() {
        let mut frame = Frame::filled(32, 32, [0, 0, 0]);
        let bbox = BoundingBox::new(10., 5., 1e12, 1e12).unwrap();
        draw_bbox(&mut frame, &bbox, GREEN);
        // top and left edges up to the frame border, right and bottom edges off frame
        assert_eq!(count(&frame, GREEN), 22 + 27 - 1);
        assert_eq!(frame.pixel(31, 5), GREEN);
        assert_eq!(frame.pixel(10, 31), GREEN);
        assert_eq!(frame.pixel(31, 31), [0, 0, 0]);
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let positions = [Vector2d::new(3.2, 4.7), Vector2d::new(11.5, 2.49)];
        for p in positions {
            let locus = Locus::Point(p);
            let mut a = Frame::filled(16, 16, [0, 0, 0]);
            let mut b = a.clone();
            annotate(&mut a, &Mark::Position(locus));
            annotate(&mut b, &Mark::Position(locus));
            assert_eq!(a, b);
            let (x, y) = marker_center(&locus);
            assert_eq!(a.pixel(x as usize, y as usize), GREEN);
        }
    }
}
