//! 즐겨찾기 토글.

use anyhow::{Context, Result};
use kimp_core::{is_krw_market, Favorites};
use std::path::Path;
use tracing::info;

/// 마켓 코드를 즐겨찾기에 넣거나 뺍니다. 추가되었으면 `true`.
pub fn toggle_favorite(path: &Path, code: &str) -> Result<bool> {
    let code = code.trim().to_uppercase();
    if !is_krw_market(&code) {
        anyhow::bail!("원화 마켓 코드가 아닙니다: {} (예: KRW-BTC)", code);
    }

    let mut favorites = Favorites::load(path)
        .with_context(|| format!("즐겨찾기 파일을 읽을 수 없습니다: {}", path.display()))?;
    let added = favorites.toggle(&code);
    favorites
        .save(path)
        .with_context(|| format!("즐겨찾기 파일을 저장할 수 없습니다: {}", path.display()))?;

    info!(code = %code, added, total = favorites.len(), "즐겨찾기 변경");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("favorites.json");

        assert!(toggle_favorite(&path, "krw-btc").unwrap());
        assert!(Favorites::load(&path).unwrap().contains("KRW-BTC"));

        assert!(!toggle_favorite(&path, "KRW-BTC").unwrap());
        assert!(Favorites::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_non_krw_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("favorites.json");

        assert!(toggle_favorite(&path, "BTC-ETH").is_err());
        assert!(!path.exists());
    }
}
