use crate::types::{HandObservation, Handedness, INDEX_FINGER_TIP, THUMB_TIP};

pub const CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (0, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (0, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (5, 9),
    (9, 13),
    (13, 17),
];

pub const SKELETON_LINE_THICKNESS: i32 = 3;
const POINT_RADIUS: i32 = 4;

const LEFT_COLOR: [u8; 4] = [56, 189, 248, 255];
const RIGHT_COLOR: [u8; 4] = [74, 222, 128, 255];
const POINT_COLOR: [u8; 4] = [248, 113, 113, 255];
const PINCH_COLOR: [u8; 4] = [250, 204, 21, 255];

pub const FALLBACK_BACKGROUND: [u8; 4] = [40, 40, 40, 255];
const FALLBACK_FOREGROUND: [u8; 4] = [230, 230, 230, 255];

/// Draws every hand's skeleton into an RGBA buffer. Landmarks are expected in
/// normalized coordinates and are scaled to the buffer size here.
pub fn draw_hands(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    hands: &[HandObservation],
    pinching: bool,
) {
    for hand in hands {
        let points: Vec<(f32, f32)> = hand
            .landmarks
            .iter()
            .map(|[x, y, _z]| (x * width as f32, y * height as f32))
            .collect();
        let color = match hand.handedness {
            Handedness::Left => LEFT_COLOR,
            Handedness::Right => RIGHT_COLOR,
        };
        draw_skeleton(buffer, width, height, &points, color);

        if pinching && hand.handedness == Handedness::Left {
            draw_line(
                buffer,
                width,
                height,
                &points[THUMB_TIP],
                &points[INDEX_FINGER_TIP],
                PINCH_COLOR,
                SKELETON_LINE_THICKNESS + 2,
            );
        }
    }
}

fn draw_skeleton(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    points: &[(f32, f32)],
    line_color: [u8; 4],
) {
    for &(a, b) in CONNECTIONS {
        if let (Some(pa), Some(pb)) = (points.get(a), points.get(b)) {
            draw_line(buffer, width, height, pa, pb, line_color, SKELETON_LINE_THICKNESS);
        }
    }

    for &(x, y) in points {
        draw_circle(buffer, width, height, (x as i32, y as i32), POINT_RADIUS, POINT_COLOR);
    }
}

/// Static "no video connection" card: a crossed-out camera on a dark field.
pub fn fallback_card(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(width as usize * height as usize * 4);
    for _ in 0..(width as usize * height as usize) {
        buffer.extend_from_slice(&FALLBACK_BACKGROUND);
    }

    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let unit = (width.min(height) as f32 / 8.0).max(4.0);
    let (x1, y1) = (cx - unit * 1.5, cy - unit);
    let (x2, y2) = (cx + unit, cy + unit);
    let outline = [
        ((x1, y1), (x2, y1)),
        ((x2, y1), (x2, y2)),
        ((x2, y2), (x1, y2)),
        ((x1, y2), (x1, y1)),
        ((x2, cy - unit * 0.4), (cx + unit * 1.8, cy - unit)),
        ((cx + unit * 1.8, cy - unit), (cx + unit * 1.8, cy + unit)),
        ((cx + unit * 1.8, cy + unit), (x2, cy + unit * 0.4)),
        ((x1 - unit * 0.5, y2 + unit * 0.5), (cx + unit * 2.3, y1 - unit * 0.5)),
    ];
    for (a, b) in outline {
        draw_line(&mut buffer, width, height, &a, &b, FALLBACK_FOREGROUND, 4);
    }
    buffer
}

fn draw_line(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    p0: &(f32, f32),
    p1: &(f32, f32),
    color: [u8; 4],
    thickness: i32,
) {
    let (mut x0, mut y0) = (p0.0 as i32, p0.1 as i32);
    let (x1, y1) = (p1.0 as i32, p1.1 as i32);
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        for ox in -radius..=radius {
            for oy in -radius..=radius {
                if ox.abs() + oy.abs() <= radius {
                    put_pixel_safe(buffer, width, height, x0 + ox, y0 + oy, color);
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

fn draw_circle(
    buffer: &mut [u8],
    width: u32,
    height: u32,
    center: (i32, i32),
    radius: i32,
    color: [u8; 4],
) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(buffer, width, height, cx + dx, cy + dy, color);
            }
        }
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}
