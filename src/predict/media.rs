/// 媒体类型判断: 按扩展名区分图片与视频/流
use std::path::Path;

/// 默认图片扩展名
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 9] =
    ["bmp", "jpg", "jpeg", "png", "tif", "tiff", "dng", "webp", "mpo"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image, // 单张图片, 无播放控制
    Video, // 视频文件或流
}

impl MediaKind {
    /// 从路径推断媒体类型 (扩展名不区分大小写, 允许带前导点)
    pub fn classify<S: AsRef<str>>(path: &Path, image_extensions: &[S]) -> Self {
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return MediaKind::Video,
        };
        let is_image = image_extensions
            .iter()
            .any(|known| known.as_ref().trim_start_matches('.').eq_ignore_ascii_case(&ext));
        if is_image {
            MediaKind::Image
        } else {
            MediaKind::Video
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, MediaKind::Image)
    }
}
