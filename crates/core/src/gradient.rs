use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorStop {
    pub pos: f32,
    pub color: [f32; 3],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradient {
    pub stops: Vec<ColorStop>,
}

pub const GRAYSCALE: &str = "grayscale";
pub const RAINBOW: &str = "rainbow";

const GRAYSCALE_STOPS: &[(f32, [u8; 3])] = &[(0.0, [0, 0, 0]), (1.0, [255, 255, 255])];
const RAINBOW_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [0, 0, 255]),
    (0.5, [0, 255, 0]),
    (1.0, [255, 0, 0]),
];
const COOLWARM_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [59, 76, 192]),
    (0.5, [221, 221, 221]),
    (1.0, [180, 4, 38]),
];
const VIRIDIS_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [68, 1, 84]),
    (0.25, [59, 82, 139]),
    (0.5, [33, 145, 140]),
    (0.75, [94, 201, 98]),
    (1.0, [253, 231, 37]),
];
const MAGMA_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [0, 0, 4]),
    (0.25, [81, 18, 124]),
    (0.5, [183, 55, 121]),
    (0.75, [252, 137, 97]),
    (1.0, [252, 253, 191]),
];
const PLASMA_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [13, 8, 135]),
    (0.25, [126, 3, 168]),
    (0.5, [204, 71, 120]),
    (0.75, [248, 149, 64]),
    (1.0, [240, 249, 33]),
];
const INFERNO_STOPS: &[(f32, [u8; 3])] = &[
    (0.0, [0, 0, 4]),
    (0.25, [87, 16, 110]),
    (0.5, [188, 55, 84]),
    (0.75, [249, 142, 9]),
    (1.0, [252, 255, 164]),
];

pub const PALETTE_NAMES: &[&str] = &[
    GRAYSCALE, RAINBOW, "coolwarm", "viridis", "magma", "plasma", "inferno",
];

impl Default for ColorGradient {
    fn default() -> Self {
        Self::from_rgb8(GRAYSCALE_STOPS)
    }
}

impl fmt::Display for ColorGradient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stops.is_empty() {
            return Ok(());
        }
        let mut stops = self.stops.clone();
        normalize_stops(&mut stops);
        for (index, stop) in stops.into_iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            write!(
                f,
                "{:.3}:{:.3},{:.3},{:.3}",
                stop.pos, stop.color[0], stop.color[1], stop.color[2]
            )?;
        }
        Ok(())
    }
}

impl ColorGradient {
    fn from_rgb8(stops: &[(f32, [u8; 3])]) -> Self {
        Self {
            stops: stops
                .iter()
                .map(|&(pos, [r, g, b])| ColorStop {
                    pos,
                    color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0],
                })
                .collect(),
        }
    }

    pub fn named(name: &str) -> Option<Self> {
        let stops = match name.trim().to_ascii_lowercase().as_str() {
            "grayscale" | "greyscale" | "gray" | "grey" | "monochrome" => GRAYSCALE_STOPS,
            "rainbow" | "blue-green-red" | "jet" => RAINBOW_STOPS,
            "coolwarm" => COOLWARM_STOPS,
            "viridis" => VIRIDIS_STOPS,
            "magma" => MAGMA_STOPS,
            "plasma" => PLASMA_STOPS,
            "inferno" => INFERNO_STOPS,
            _ => return None,
        };
        Some(Self::from_rgb8(stops))
    }

    /// Named palette first, then the `pos:color;...` text form.
    pub fn resolve(name: &str) -> Option<Self> {
        Self::named(name).or_else(|| Self::parse(name))
    }

    pub fn sample(&self, t: f32) -> [f32; 3] {
        if self.stops.is_empty() {
            return [1.0, 1.0, 1.0];
        }
        let t = t.clamp(0.0, 1.0);
        if self.stops.len() == 1 {
            return self.stops[0].color;
        }
        let mut prev = self.stops[0];
        for stop in &self.stops[1..] {
            if t <= stop.pos {
                let denom = (stop.pos - prev.pos).max(1.0e-6);
                let u = ((t - prev.pos) / denom).clamp(0.0, 1.0);
                return [
                    lerp(prev.color[0], stop.color[0], u),
                    lerp(prev.color[1], stop.color[1], u),
                    lerp(prev.color[2], stop.color[2], u),
                ];
            }
            prev = *stop;
        }
        prev.color
    }

    pub fn midpoint(&self) -> [f32; 3] {
        self.sample(0.5)
    }

    pub fn parse(value: &str) -> Option<Self> {
        let mut stops = Vec::new();
        let cleaned = value.trim();
        if cleaned.is_empty() {
            return None;
        }
        for token in cleaned.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let (pos_str, color_str) = token
                .split_once(':')
                .or_else(|| token.split_once('='))
                .unwrap_or((token, ""));
            let pos = pos_str.trim().parse::<f32>().ok()?;
            let color = parse_color(color_str.trim())?;
            stops.push(ColorStop { pos, color });
        }
        if stops.is_empty() {
            return None;
        }
        normalize_stops(&mut stops);
        if stops.len() == 1 {
            let stop = stops[0];
            stops.push(ColorStop {
                pos: 1.0,
                color: stop.color,
            });
        }
        Some(ColorGradient { stops })
    }
}

fn normalize_stops(stops: &mut [ColorStop]) {
    for stop in stops.iter_mut() {
        if !stop.pos.is_finite() {
            stop.pos = 0.0;
        }
        stop.pos = stop.pos.clamp(0.0, 1.0);
        stop.color = clamp_color(stop.color);
    }
    stops.sort_by(|a, b| {
        a.pos
            .partial_cmp(&b.pos)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn parse_color(value: &str) -> Option<[f32; 3]> {
    if value.is_empty() {
        return None;
    }
    let trimmed = value.trim();
    if let Some(hex) = trimmed.strip_prefix('#') {
        if !hex.is_ascii() || hex.len() != 6 {
            return None;
        }
        let channel = |range| u8::from_str_radix(hex.get(range)?, 16).ok();
        let r = channel(0..2)? as f32 / 255.0;
        let g = channel(2..4)? as f32 / 255.0;
        let b = channel(4..6)? as f32 / 255.0;
        return Some([r, g, b]);
    }
    let mut parts = trimmed
        .split([',', ' '])
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>();
    if parts.len() < 3 {
        return None;
    }
    parts.truncate(3);
    let mut values = [0.0f32; 3];
    for (idx, part) in parts.iter().enumerate() {
        values[idx] = part.parse::<f32>().ok()?;
    }
    if values.iter().any(|v| *v > 1.5) {
        values = [values[0] / 255.0, values[1] / 255.0, values[2] / 255.0];
    }
    Some(clamp_color(values))
}

fn clamp_color(color: [f32; 3]) -> [f32; 3] {
    [
        color[0].clamp(0.0, 1.0),
        color[1].clamp(0.0, 1.0),
        color[2].clamp(0.0, 1.0),
    ]
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
