use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// D65 reference white used for every XYZ <-> L*a*b* conversion.
const WHITE_X: f64 = 0.95047;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.08883;

const EPSILON_DELTA: f64 = 6.0 / 29.0;

/// Just-noticeable difference for CIE76 Delta E.
pub const DEFAULT_JND_THRESHOLD: f32 = 2.3;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorParseError {
    #[error("hex color must have 3 or 6 digits, got '{0}'")]
    InvalidLength(String),
    #[error("hex color contains non-hex digits: '{0}'")]
    InvalidDigit(String),
}

/// 8-bit sRGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    pub fn to_lab(&self) -> Lab {
        srgb_to_lab(*self)
    }
}

impl FromStr for Rgb8 {
    type Err = ColorParseError;

    /// Accepts `#RRGGBB`, `RRGGBB`, `#RGB` and `RGB`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_start_matches('#');
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::InvalidDigit(s.to_string()));
        }

        let expanded = match digits.len() {
            6 => digits.to_string(),
            3 => digits.chars().flat_map(|c| [c, c]).collect(),
            _ => return Err(ColorParseError::InvalidLength(s.to_string())),
        };

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&expanded[range], 16)
                .map_err(|_| ColorParseError::InvalidDigit(s.to_string()))
        };

        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

impl fmt::Display for Rgb8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// CIE L*a*b* color (D65).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl Lab {
    pub fn new(l: f32, a: f32, b: f32) -> Self {
        Self { l, a, b }
    }

    pub fn is_finite(&self) -> bool {
        self.l.is_finite() && self.a.is_finite() && self.b.is_finite()
    }

    /// Nearest displayable sRGB color, clamped to gamut.
    pub fn to_rgb(&self) -> Rgb8 {
        lab_to_srgb(*self)
    }

    pub fn to_hex(&self) -> String {
        self.to_rgb().to_hex()
    }

    /// Total order used for deterministic tie-breaking.
    pub fn total_cmp(&self, other: &Lab) -> std::cmp::Ordering {
        self.l
            .total_cmp(&other.l)
            .then(self.a.total_cmp(&other.a))
            .then(self.b.total_cmp(&other.b))
    }
}

/// Perceptual distance metric used by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance in L*a*b*; 2.3 is the classic JND.
    #[default]
    Cie76,
    Ciede2000,
}

impl DistanceMetric {
    pub fn distance(&self, x: &Lab, y: &Lab) -> f32 {
        match self {
            DistanceMetric::Cie76 => delta_e76(x, y),
            DistanceMetric::Ciede2000 => delta_e2000(x, y),
        }
    }
}

fn srgb_channel_to_linear(c: u8) -> f64 {
    let c = c as f64 / 255.0;
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb_channel(c: f64) -> u8 {
    let c = c.clamp(0.0, 1.0);
    let v = if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn lab_f(t: f64) -> f64 {
    if t > EPSILON_DELTA.powi(3) {
        t.cbrt()
    } else {
        t / (3.0 * EPSILON_DELTA * EPSILON_DELTA) + 4.0 / 29.0
    }
}

fn lab_f_inv(t: f64) -> f64 {
    if t > EPSILON_DELTA {
        t.powi(3)
    } else {
        3.0 * EPSILON_DELTA * EPSILON_DELTA * (t - 4.0 / 29.0)
    }
}

pub fn srgb_to_lab(rgb: Rgb8) -> Lab {
    let r = srgb_channel_to_linear(rgb.r);
    let g = srgb_channel_to_linear(rgb.g);
    let b = srgb_channel_to_linear(rgb.b);

    let x = 0.412_456_4 * r + 0.357_576_1 * g + 0.180_437_5 * b;
    let y = 0.212_672_9 * r + 0.715_152_2 * g + 0.072_175_0 * b;
    let z = 0.019_333_9 * r + 0.119_192_0 * g + 0.950_304_1 * b;

    let fx = lab_f(x / WHITE_X);
    let fy = lab_f(y / WHITE_Y);
    let fz = lab_f(z / WHITE_Z);

    Lab {
        l: (116.0 * fy - 16.0) as f32,
        a: (500.0 * (fx - fy)) as f32,
        b: (200.0 * (fy - fz)) as f32,
    }
}

pub fn lab_to_srgb(lab: Lab) -> Rgb8 {
    let fy = (lab.l as f64 + 16.0) / 116.0;
    let fx = fy + lab.a as f64 / 500.0;
    let fz = fy - lab.b as f64 / 200.0;

    let x = WHITE_X * lab_f_inv(fx);
    let y = WHITE_Y * lab_f_inv(fy);
    let z = WHITE_Z * lab_f_inv(fz);

    let r = 3.240_454_2 * x - 1.537_138_5 * y - 0.498_531_4 * z;
    let g = -0.969_266_0 * x + 1.876_010_8 * y + 0.041_556_0 * z;
    let b = 0.055_643_4 * x - 0.204_025_9 * y + 1.057_225_2 * z;

    Rgb8 {
        r: linear_to_srgb_channel(r),
        g: linear_to_srgb_channel(g),
        b: linear_to_srgb_channel(b),
    }
}

pub fn delta_e76(x: &Lab, y: &Lab) -> f32 {
    let dl = (x.l - y.l) as f64;
    let da = (x.a - y.a) as f64;
    let db = (x.b - y.b) as f64;
    (dl * dl + da * da + db * db).sqrt() as f32
}

pub fn delta_e2000(x: &Lab, y: &Lab) -> f32 {
    let (l1, a1, b1) = (x.l as f64, x.a as f64, x.b as f64);
    let (l2, a2, b2) = (y.l as f64, y.a as f64, y.b as f64);
    let pow25_7 = 25f64.powi(7);

    let c_bar = (a1.hypot(b1) + a2.hypot(b2)) / 2.0;
    let c_bar7 = c_bar.powi(7);
    let g = 0.5 * (1.0 - (c_bar7 / (c_bar7 + pow25_7)).sqrt());

    let a1p = (1.0 + g) * a1;
    let a2p = (1.0 + g) * a2;
    let c1p = a1p.hypot(b1);
    let c2p = a2p.hypot(b2);

    let hue = |b: f64, ap: f64| {
        if b == 0.0 && ap == 0.0 {
            0.0
        } else {
            let h = b.atan2(ap).to_degrees();
            if h < 0.0 {
                h + 360.0
            } else {
                h
            }
        }
    };
    let h1p = hue(b1, a1p);
    let h2p = hue(b2, a2p);

    let delta_lp = l2 - l1;
    let delta_cp = c2p - c1p;
    let chroma_product = c1p * c2p;

    let delta_hp = if chroma_product == 0.0 {
        0.0
    } else {
        let d = h2p - h1p;
        if d > 180.0 {
            d - 360.0
        } else if d < -180.0 {
            d + 360.0
        } else {
            d
        }
    };
    let delta_big_hp = 2.0 * chroma_product.sqrt() * (delta_hp / 2.0).to_radians().sin();

    let l_bar_p = (l1 + l2) / 2.0;
    let c_bar_p = (c1p + c2p) / 2.0;
    let h_bar_p = if chroma_product == 0.0 {
        h1p + h2p
    } else if (h1p - h2p).abs() <= 180.0 {
        (h1p + h2p) / 2.0
    } else if h1p + h2p < 360.0 {
        (h1p + h2p + 360.0) / 2.0
    } else {
        (h1p + h2p - 360.0) / 2.0
    };

    let t = 1.0 - 0.17 * (h_bar_p - 30.0).to_radians().cos()
        + 0.24 * (2.0 * h_bar_p).to_radians().cos()
        + 0.32 * (3.0 * h_bar_p + 6.0).to_radians().cos()
        - 0.20 * (4.0 * h_bar_p - 63.0).to_radians().cos();

    let delta_theta = 30.0 * (-((h_bar_p - 275.0) / 25.0).powi(2)).exp();
    let c_bar_p7 = c_bar_p.powi(7);
    let r_c = 2.0 * (c_bar_p7 / (c_bar_p7 + pow25_7)).sqrt();
    let l_offset = (l_bar_p - 50.0).powi(2);
    let s_l = 1.0 + 0.015 * l_offset / (20.0 + l_offset).sqrt();
    let s_c = 1.0 + 0.045 * c_bar_p;
    let s_h = 1.0 + 0.015 * c_bar_p * t;
    let r_t = -(2.0 * delta_theta).to_radians().sin() * r_c;

    let dl = delta_lp / s_l;
    let dc = delta_cp / s_c;
    let dh = delta_big_hp / s_h;

    (dl * dl + dc * dc + dh * dh + r_t * dc * dh).sqrt() as f32
}
