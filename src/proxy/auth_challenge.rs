//! # WWW-Authenticate 改写
//!
//! 按 RFC 9110 的 challenge 语法扫描头部，只替换第一个 `realm` 参数的值，
//! 其余字节原样保留。无法解析或没有 realm 时返回 None，调用方原样转发。

use std::ops::Range;

/// 把第一个 `realm` 参数替换为 `new_realm`
///
/// 对同一个 `new_realm` 重复调用结果不变。
#[must_use]
pub fn rewrite_realm(header: &str, new_realm: &str) -> Option<String> {
    let span = find_realm_value(header)?;

    let quoted = quote(new_realm);
    let mut rewritten = String::with_capacity(header.len() - span.len() + quoted.len());
    rewritten.push_str(&header[..span.start]);
    rewritten.push_str(&quoted);
    rewritten.push_str(&header[span.end..]);
    Some(rewritten)
}

/// 第一个 realm 值（含引号）在头部中的字节范围
fn find_realm_value(header: &str) -> Option<Range<usize>> {
    let bytes = header.as_bytes();
    let mut i = 0;

    loop {
        while i < bytes.len() && (bytes[i] == b',' || is_whitespace(bytes[i])) {
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }

        let name_start = i;
        while i < bytes.len() && is_token_char(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            return None;
        }
        let name = &header[name_start..i];

        let mut j = i;
        while j < bytes.len() && is_whitespace(bytes[j]) {
            j += 1;
        }
        if j >= bytes.len() || bytes[j] != b'=' {
            // auth-scheme 或不带填充的 token68
            i = j;
            continue;
        }

        j += 1;
        while j < bytes.len() && is_whitespace(bytes[j]) {
            j += 1;
        }

        let value = if j < bytes.len() && bytes[j] == b'"' {
            quoted_string_end(bytes, j).map(|end| j..end)
        } else if j < bytes.len() && is_token_char(bytes[j]) {
            let start = j;
            while j < bytes.len() && is_token_char(bytes[j]) {
                j += 1;
            }
            Some(start..j)
        } else {
            // token68 的 '=' 填充
            while j < bytes.len() && bytes[j] == b'=' {
                j += 1;
            }
            i = j;
            continue;
        };

        // 未闭合的引号：整段头部视为不可解析
        let value = value?;
        if name.eq_ignore_ascii_case("realm") {
            return Some(value);
        }
        i = value.end;
    }
}

/// 从开引号位置开始，返回闭引号之后的下标
fn quoted_string_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut k = open + 1;
    while k < bytes.len() {
        match bytes[k] {
            b'\\' => k += 2,
            b'"' => return Some(k + 1),
            _ => k += 1,
        }
    }
    None
}

fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

const fn is_whitespace(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// tchar，外加 token68 里会出现的 '/'
const fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
                | b'/'
        )
}
