/// 进度消息解析 (Progress Message Parser)
///
/// 推理引擎输出的进度文本, 以空白分隔:
/// ```text
/// video 1/1 (3/120) /data/clip.mp4: 384x640 2 persons, Done. (0.041s)
/// image 1/1 /data/a.jpg: 384x640 1 person, Done. (0.012s)
/// ```
/// - `(a/b)`: 当前帧 / 总帧数 (仅视频)
/// - `(Xs)`:  单帧耗时(秒), 总是最后一个token
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::{ProgressEvent, ProgressKind};

/// 剩余帧数不超过该值时直接视为完成, 避免进度条尾部抖动
pub const NEAR_COMPLETE_FRAMES: u64 = 2;

static FRACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\((\d+)/(\d+)\)$").unwrap());
static FRACTION_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\([^/()]*/[^/()]*\)$").unwrap());
static SECONDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((\d+(?:\.\d*)?|\.\d+)s\)$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("message carries no structured progress")]
    NoStructuredProgress,

    #[error("video message without a (current/total) token")]
    MissingFraction,

    #[error("malformed frame fraction: {0}")]
    InvalidFraction(String),
}

/// 解析一条原始消息; 纯函数, 无状态
pub fn parse_message(message: &str) -> Result<ProgressEvent, ParseError> {
    let tokens: Vec<&str> = message.split_whitespace().collect();
    let seconds = tokens.last().and_then(|token| parse_seconds(token));

    // 无冒号的行只有 "video ... (a/b)" 短格式带进度, 其余视为普通日志
    if !message.contains(':') && !is_short_video(message, &tokens) {
        return Err(ParseError::NoStructuredProgress);
    }

    let (kind, percent) = if message.contains("video") {
        (ProgressKind::VideoFrame, video_percent(&tokens)?)
    } else {
        (ProgressKind::ImageSingleShot, 100)
    };

    Ok(ProgressEvent {
        kind,
        percent,
        fps: seconds.and_then(fps_from_seconds),
    })
}

fn is_short_video(message: &str, tokens: &[&str]) -> bool {
    message.contains("video") && tokens.iter().any(|token| FRACTION.is_match(token))
}

fn video_percent(tokens: &[&str]) -> Result<u8, ParseError> {
    let mut malformed = None;
    for token in tokens {
        if let Some(caps) = FRACTION.captures(token) {
            let current: u64 = caps[1]
                .parse()
                .map_err(|_| ParseError::InvalidFraction(token.to_string()))?;
            let total: u64 = caps[2]
                .parse()
                .map_err(|_| ParseError::InvalidFraction(token.to_string()))?;
            return percent_of(current, total)
                .ok_or_else(|| ParseError::InvalidFraction(token.to_string()));
        }
        if malformed.is_none() && FRACTION_LIKE.is_match(token) {
            malformed = Some(token.to_string());
        }
    }
    Err(match malformed {
        Some(token) => ParseError::InvalidFraction(token),
        None => ParseError::MissingFraction,
    })
}

/// floor(100*a/b), 上限100; 剩余帧数 <= 2 时为100
pub fn percent_of(current: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    if total.saturating_sub(current) <= NEAR_COMPLETE_FRAMES {
        return Some(100);
    }
    let percent = (current as u128 * 100) / total as u128;
    Some(percent.min(100) as u8)
}

fn parse_seconds(token: &str) -> Option<f64> {
    SECONDS
        .captures(token)
        .and_then(|caps| caps[1].parse::<f64>().ok())
}

fn fps_from_seconds(seconds: f64) -> Option<f64> {
    if seconds > 0.0 && seconds.is_finite() {
        Some(1.0 / seconds)
    } else {
        None
    }
}
