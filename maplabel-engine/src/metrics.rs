/// 文字度量服务，返回单行文字在给定字号下的 `(宽, 高)`。
pub trait TextMetrics {
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64);
}

/// 等宽近似：每个字符宽 `advance × 字号`，行高 `line_height × 字号`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAdvanceMetrics {
    pub advance: f64,
    pub line_height: f64,
}

impl Default for FixedAdvanceMetrics {
    fn default() -> Self {
        Self {
            advance: 0.6,
            line_height: 1.2,
        }
    }
}

impl TextMetrics for FixedAdvanceMetrics {
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64) {
        let chars = text.chars().count() as f64;
        (
            chars * self.advance * font_size,
            self.line_height * font_size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_scales_with_font_size() {
        let metrics = FixedAdvanceMetrics::default();
        let (w, h) = metrics.measure("abcd", 10.0);
        assert!((w - 24.0).abs() < 1e-9);
        assert!((h - 12.0).abs() < 1e-9);
        let (w, _) = metrics.measure("汉字", 5.0);
        assert!((w - 6.0).abs() < 1e-9);
    }
}
