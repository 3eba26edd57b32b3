//! # 镜像源列表解析
//!
//! 源是一个 JSON 数组，每项形如 `{name, url, tags}`；tags 可以是字符串，
//! 也可以是 `{name}` 对象。

use crate::upstream::normalize_registry_url;
use serde_json::Value;

/// 未提供名称时的显示名
pub const UNKNOWN_MIRROR_NAME: &str = "Unknown Mirror";

/// 一条通过筛选的候选镜像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCandidate {
    pub name: String,
    /// 已规范化的地址
    pub url: String,
}

/// 单条记录被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedReject {
    /// 不是 JSON 对象
    Malformed,
    /// 缺少地址或地址不是 http(s)
    MissingUrl,
    /// 标签命中拒绝标记
    Marker(String),
}

impl std::fmt::Display for FeedReject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed entry"),
            Self::MissingUrl => f.write_str("missing url"),
            Self::Marker(tag) => write!(f, "rejected tag: {tag}"),
        }
    }
}

/// 解析并筛选一条记录
pub fn parse_entry(entry: &Value, reject_markers: &[String]) -> Result<FeedCandidate, FeedReject> {
    let object = entry.as_object().ok_or(FeedReject::Malformed)?;

    if let Some(tag) = tag_names(object.get("tags"))
        .into_iter()
        .find(|tag| reject_markers.iter().any(|marker| tag.contains(marker.as_str())))
    {
        return Err(FeedReject::Marker(tag));
    }

    let url = object
        .get("url")
        .and_then(Value::as_str)
        .map(normalize_registry_url)
        .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        .ok_or(FeedReject::MissingUrl)?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_MIRROR_NAME)
        .to_string();

    Ok(FeedCandidate { name, url })
}

fn tag_names(tags: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(tags)) = tags else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(|tag| match tag {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map.get("name").and_then(Value::as_str).map(str::to_string),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn markers() -> Vec<String> {
        vec!["付费".into(), "内网".into(), "需登陆".into()]
    }

    #[test]
    fn test_accepts_and_normalizes() {
        let entry = json!({"name": "Mirror A", "url": "https://a.example.com/", "tags": [{"name": "稳定"}]});
        assert_eq!(
            parse_entry(&entry, &markers()).unwrap(),
            FeedCandidate {
                name: "Mirror A".into(),
                url: "https://a.example.com".into()
            }
        );
    }

    #[test]
    fn test_marker_tags_reject() {
        let object_tag = json!({"name": "B", "url": "https://b.example.com", "tags": [{"name": "需登陆"}]});
        let string_tag = json!({"name": "C", "url": "https://c.example.com", "tags": ["仅内网可用"]});

        assert_eq!(
            parse_entry(&object_tag, &markers()),
            Err(FeedReject::Marker("需登陆".into()))
        );
        assert_eq!(
            parse_entry(&string_tag, &markers()),
            Err(FeedReject::Marker("仅内网可用".into()))
        );
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(parse_entry(&json!({"name": "x"}), &markers()), Err(FeedReject::MissingUrl));
        assert_eq!(
            parse_entry(&json!({"url": "ftp://x"}), &markers()),
            Err(FeedReject::MissingUrl)
        );
        assert_eq!(parse_entry(&json!("https://x"), &markers()), Err(FeedReject::Malformed));

        let unnamed = parse_entry(&json!({"url": "https://d.example.com"}), &markers()).unwrap();
        assert_eq!(unnamed.name, UNKNOWN_MIRROR_NAME);
    }
}
