/// Borrowed 8-bit grayscale image, row-major, `data.len() == width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned 8-bit grayscale image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

impl GrayImageView<'_> {
    /// Pixel at `(x, y)`; the caller guarantees the coordinate is inside.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// `true` when `(x, y)` lies inside `[0, w-1] x [0, h-1]`.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x <= (self.width - 1) as f32 && y <= (self.height - 1) as f32
    }
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample with integer coordinates at pixel centres.
///
/// Neighbours outside the image read as zero; callers that must not bleed
/// black into the result check [`GrayImageView::contains`] first.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[inline]
pub fn sample_bilinear_u8(src: &GrayImageView<'_>, x: f32, y: f32) -> u8 {
    sample_bilinear(src, x, y).round().clamp(0.0, 255.0) as u8
}

/// Separable box blur with edge clamping.
///
/// `radius == 0` returns a copy. Uses running sums, so the cost does not
/// depend on the radius.
pub fn box_blur(src: &GrayImageView<'_>, radius: usize) -> GrayImage {
    let (w, h) = (src.width, src.height);
    if radius == 0 || w == 0 || h == 0 {
        return GrayImage {
            width: w,
            height: h,
            data: src.data.to_vec(),
        };
    }

    let r = radius as isize;
    let norm = (2 * radius + 1) as u32;
    let clamp = |v: isize, hi: usize| v.clamp(0, hi as isize - 1) as usize;

    let mut horizontal = vec![0u8; w * h];
    for y in 0..h {
        let row = &src.data[y * w..(y + 1) * w];
        let mut acc: u32 = (-r..=r).map(|dx| row[clamp(dx, w)] as u32).sum();
        for x in 0..w {
            horizontal[y * w + x] = ((acc + norm / 2) / norm) as u8;
            let leaving = row[clamp(x as isize - r, w)] as u32;
            let entering = row[clamp(x as isize + r + 1, w)] as u32;
            acc = acc + entering - leaving;
        }
    }

    let mut out = vec![0u8; w * h];
    for x in 0..w {
        let at = |y: isize| horizontal[clamp(y, h) * w + x] as u32;
        let mut acc: u32 = (-r..=r).map(at).sum();
        for y in 0..h {
            out[y * w + x] = ((acc + norm / 2) / norm) as u8;
            acc = acc + at(y as isize + r + 1) - at(y as isize - r);
        }
    }

    GrayImage {
        width: w,
        height: h,
        data: out,
    }
}

/// Linear min-max stretch onto `[0, 255]`.
///
/// The darkest pixel maps to 0 and the brightest to 255. A constant image
/// maps to all zeros.
pub fn normalize_min_max(src: &GrayImageView<'_>) -> GrayImage {
    let (lo, hi) = src
        .data
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let lut: [u8; 256] = if hi > lo {
        let scale = 255.0 / (hi - lo) as f32;
        std::array::from_fn(|v| {
            ((v as f32 - lo as f32) * scale).round().clamp(0.0, 255.0) as u8
        })
    } else {
        [0; 256]
    };
    GrayImage {
        width: src.width,
        height: src.height,
        data: src.data.iter().map(|&v| lut[v as usize]).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let img = GrayImage::from_fn(2, 2, |x, y| ((x + 2 * y) * 40) as u8);
        let v = img.view();
        assert_eq!(sample_bilinear(&v, 0.0, 0.0), 0.0);
        assert!((sample_bilinear(&v, 0.5, 0.0) - 20.0).abs() < 1e-5);
        assert!((sample_bilinear(&v, 0.5, 0.5) - 60.0).abs() < 1e-5);
        assert_eq!(sample_bilinear_u8(&v, 1.0, 1.0), 120);
    }

    #[test]
    fn contains_uses_pixel_centre_bounds() {
        let img = GrayImage::filled(4, 3, 0);
        let v = img.view();
        assert!(v.contains(0.0, 0.0));
        assert!(v.contains(3.0, 2.0));
        assert!(!v.contains(3.01, 1.0));
        assert!(!v.contains(-0.01, 1.0));
    }

    #[test]
    fn box_blur_keeps_constant_images() {
        let img = GrayImage::filled(9, 7, 77);
        let blurred = box_blur(&img.view(), 2);
        assert!(blurred.data.iter().all(|&p| p == 77));
    }

    #[test]
    fn box_blur_spreads_a_single_spike() {
        let mut img = GrayImage::filled(7, 7, 0);
        img.data[3 * 7 + 3] = 225;
        let blurred = box_blur(&img.view(), 1);
        // 225 / 9 in each cell of the 3x3 neighbourhood.
        assert_eq!(blurred.data[3 * 7 + 3], 25);
        assert_eq!(blurred.data[2 * 7 + 2], 25);
        assert_eq!(blurred.data[0], 0);
    }

    #[test]
    fn min_max_stretch_spans_the_full_range() {
        let img = GrayImage::from_fn(4, 1, |x, _| 10 + 5 * x as u8);
        let out = normalize_min_max(&img.view());
        assert_eq!(out.data, vec![0, 85, 170, 255]);

        let flat = normalize_min_max(&GrayImage::filled(3, 3, 40).view());
        assert!(flat.data.iter().all(|&p| p == 0));

        let full = GrayImage::from_fn(2, 1, |x, _| if x == 0 { 0 } else { 255 });
        assert_eq!(normalize_min_max(&full.view()), full);
    }
}
