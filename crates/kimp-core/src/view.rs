//! 정렬/필터 뷰.
//!
//! 게시 상태에서 언제든 다시 계산할 수 있는 파생 목록입니다.
//! 가격 변동마다 화면이 튀지 않도록 느린 주기(기본 3초)와 사용자 조작 시에만 재계산합니다.

use crate::domain::{CrossExchangeTicker, MarketCatalog};
use crate::favorites::Favorites;
use crate::state::MarketSnapshot;
use crate::types::is_krw_market;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 정렬 컬럼.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    /// 마켓 코드
    Code,
    /// 한글 이름
    KoreanName,
    /// 영문 이름
    EnglishName,
    /// 현재가
    TradePrice,
    /// 전일 대비 등락율
    ChangeRate,
    /// 김치 프리미엄
    Premium,
    /// 원화 가격 차이
    PriceGap,
    /// 24시간 거래대금
    Volume,
}

impl SortColumn {
    /// 숫자 비교 컬럼인지 확인합니다.
    pub fn is_numeric(&self) -> bool {
        !matches!(self, Self::Code | Self::KoreanName | Self::EnglishName)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::KoreanName => "korean_name",
            Self::EnglishName => "english_name",
            Self::TradePrice => "price",
            Self::ChangeRate => "change",
            Self::Premium => "premium",
            Self::PriceGap => "gap",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "code" | "symbol" => Ok(Self::Code),
            "korean_name" | "name" | "korean" => Ok(Self::KoreanName),
            "english_name" | "english" => Ok(Self::EnglishName),
            "price" | "trade_price" => Ok(Self::TradePrice),
            "change" | "change_rate" => Ok(Self::ChangeRate),
            "premium" | "kimp" => Ok(Self::Premium),
            "gap" | "price_gap" => Ok(Self::PriceGap),
            "volume" => Ok(Self::Volume),
            _ => Err(format!("알 수 없는 정렬 컬럼: {}", s)),
        }
    }
}

/// 정렬 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            Self::Ascending => Self::Descending,
            Self::Descending => Self::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

/// 현재 정렬 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            column: SortColumn::Volume,
            direction: SortDirection::Descending,
        }
    }
}

impl SortState {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// 컬럼 헤더 클릭.
    ///
    /// 현재 컬럼이면 방향을 뒤집고, 다른 컬럼이면 내림차순으로 초기화합니다.
    pub fn toggle(&mut self, column: SortColumn) {
        if self.column == column {
            self.direction = self.direction.flip();
        } else {
            self.column = column;
            self.direction = SortDirection::Descending;
        }
    }
}

/// 재계산 입력 (정렬 상태 + 검색어).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewQuery {
    pub sort: SortState,
    pub search: String,
}

impl ViewQuery {
    pub fn new(sort: SortState, search: impl Into<String>) -> Self {
        Self {
            sort,
            search: search.into(),
        }
    }
}

enum SortKey {
    Text(String),
    Number(Option<Decimal>),
}

/// 정렬/필터 뷰.
///
/// 직전 결과 순서를 기억해 동률 항목이 재계산 사이에 자리를 바꾸지 않게 합니다.
#[derive(Debug, Clone, Default)]
pub struct SortFilterView {
    catalog: MarketCatalog,
    order: Vec<String>,
}

impl SortFilterView {
    pub fn new(catalog: MarketCatalog) -> Self {
        Self {
            catalog,
            order: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &MarketCatalog {
        &self.catalog
    }

    /// 마지막 재계산 결과.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// 스냅샷을 필터링하고 정렬한 마켓 코드 목록을 반환합니다.
    ///
    /// 1. 원화 마켓만, 검색어가 있으면 코드/한글명/영문명 부분 일치(대소문자 무시)
    /// 2. 직전 순서(새 심볼은 코드순으로 뒤에) 기준 안정 정렬
    /// 3. 즐겨찾기 먼저, 각 그룹은 선택한 컬럼/방향으로 독립 정렬
    pub fn recompute(&mut self, snapshot: &MarketSnapshot, query: &ViewQuery, favorites: &Favorites) -> Vec<String> {
        let needle = query.search.trim().to_lowercase();

        let mut codes: Vec<&String> = snapshot
            .keys()
            .filter(|code| is_krw_market(code))
            .filter(|code| needle.is_empty() || self.matches(code, &needle))
            .collect();

        let prior: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, code)| (code.as_str(), i))
            .collect();
        codes.sort_by(|a, b| {
            let ra = prior.get(a.as_str()).copied().unwrap_or(usize::MAX);
            let rb = prior.get(b.as_str()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.cmp(b))
        });

        let sort = query.sort;
        let mut keyed: Vec<(&String, SortKey)> = codes
            .into_iter()
            .map(|code| (code, self.sort_key(sort.column, code, &snapshot[code])))
            .collect();
        keyed.sort_by(|(_, a), (_, b)| compare(a, b, sort.direction));

        let (mut ordered, rest): (Vec<String>, Vec<String>) = keyed
            .into_iter()
            .map(|(code, _)| code.clone())
            .partition(|code| favorites.contains(code));
        ordered.extend(rest);

        self.order = ordered.clone();
        ordered
    }

    fn matches(&self, code: &str, needle: &str) -> bool {
        if code.to_lowercase().contains(needle) {
            return true;
        }
        self.catalog.get(code).is_some_and(|info| {
            info.korean_name.to_lowercase().contains(needle)
                || info.english_name.to_lowercase().contains(needle)
        })
    }

    fn sort_key(&self, column: SortColumn, code: &str, entry: &CrossExchangeTicker) -> SortKey {
        let info = self.catalog.get(code);
        match column {
            SortColumn::Code => SortKey::Text(code.to_lowercase()),
            SortColumn::KoreanName => {
                SortKey::Text(info.map(|i| i.korean_name.to_lowercase()).unwrap_or_default())
            }
            SortColumn::EnglishName => {
                SortKey::Text(info.map(|i| i.english_name.to_lowercase()).unwrap_or_default())
            }
            SortColumn::TradePrice => SortKey::Number(Some(entry.ticker.trade_price)),
            SortColumn::ChangeRate => SortKey::Number(Some(entry.ticker.signed_change_rate)),
            SortColumn::Premium => SortKey::Number(entry.premium),
            SortColumn::PriceGap => SortKey::Number(entry.price_gap),
            SortColumn::Volume => SortKey::Number(Some(entry.ticker.acc_trade_price_24h)),
        }
    }
}

/// 값이 없는 숫자는 방향과 무관하게 항상 뒤로 보냅니다.
fn compare(a: &SortKey, b: &SortKey, direction: SortDirection) -> Ordering {
    match (a, b) {
        (SortKey::Text(a), SortKey::Text(b)) => direction.apply(a.cmp(b)),
        (SortKey::Number(Some(a)), SortKey::Number(Some(b))) => direction.apply(a.cmp(b)),
        (SortKey::Number(None), SortKey::Number(None)) => Ordering::Equal,
        (SortKey::Number(None), _) => Ordering::Greater,
        (_, SortKey::Number(None)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MarketInfo, MarketTicker};
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn snapshot(rows: &[(&str, Decimal, Option<Decimal>)]) -> MarketSnapshot {
        let map = rows
            .iter()
            .map(|(code, price, premium)| {
                let entry = CrossExchangeTicker {
                    ticker: MarketTicker {
                        trade_price: *price,
                        ..MarketTicker::new(*code)
                    },
                    premium: *premium,
                    ..Default::default()
                };
                (code.to_string(), Arc::new(entry))
            })
            .collect();
        Arc::new(map)
    }

    fn catalog() -> MarketCatalog {
        MarketCatalog::new(vec![
            MarketInfo::new("KRW-A", "에이", "Alpha"),
            MarketInfo::new("KRW-B", "비", "Beta"),
            MarketInfo::new("KRW-C", "씨", "Gamma"),
            MarketInfo::new("KRW-D", "디", "Delta"),
            MarketInfo::new("KRW-BTC", "비트코인", "Bitcoin"),
            MarketInfo::new("KRW-ETH", "이더리움", "Ethereum"),
            MarketInfo::new("BTC-ETH", "이더리움", "Ethereum"),
        ])
    }

    fn by_price_desc() -> ViewQuery {
        ViewQuery::new(SortState::new(SortColumn::TradePrice, SortDirection::Descending), "")
    }

    #[test]
    fn test_favorites_first_each_tier_sorted() {
        // B > D > A > C
        let snap = snapshot(&[
            ("KRW-A", dec!(20), None),
            ("KRW-B", dec!(40), None),
            ("KRW-C", dec!(10), None),
            ("KRW-D", dec!(30), None),
        ]);
        let favorites: Favorites = ["KRW-A", "KRW-C"].into_iter().collect();

        let mut view = SortFilterView::new(catalog());
        let order = view.recompute(&snap, &by_price_desc(), &favorites);
        assert_eq!(order, vec!["KRW-A", "KRW-C", "KRW-B", "KRW-D"]);
    }

    #[test]
    fn test_korean_search() {
        let snap = snapshot(&[
            ("KRW-BTC", dec!(100), None),
            ("KRW-ETH", dec!(10), None),
        ]);
        let mut view = SortFilterView::new(catalog());
        let query = ViewQuery::new(SortState::default(), "비트");
        assert_eq!(view.recompute(&snap, &query, &Favorites::new()), vec!["KRW-BTC"]);

        let query = ViewQuery::new(SortState::default(), "ETHER");
        assert_eq!(view.recompute(&snap, &query, &Favorites::new()), vec!["KRW-ETH"]);
    }

    #[test]
    fn test_empty_search_returns_all_krw_markets() {
        let mut snap = (*snapshot(&[("KRW-BTC", dec!(100), None), ("KRW-ETH", dec!(10), None)])).clone();
        snap.insert(
            "BTC-ETH".to_string(),
            Arc::new(CrossExchangeTicker {
                ticker: MarketTicker::new("BTC-ETH"),
                ..Default::default()
            }),
        );
        let snap = Arc::new(snap);

        let mut view = SortFilterView::new(catalog());
        let order = view.recompute(&snap, &by_price_desc(), &Favorites::new());
        assert_eq!(order, vec!["KRW-BTC", "KRW-ETH"]);
    }

    #[test]
    fn test_missing_premium_sorts_last_in_both_directions() {
        let snap = snapshot(&[
            ("KRW-A", dec!(1), None),
            ("KRW-B", dec!(1), Some(dec!(2))),
            ("KRW-C", dec!(1), Some(dec!(-1))),
        ]);
        let mut view = SortFilterView::new(catalog());

        let desc = ViewQuery::new(SortState::new(SortColumn::Premium, SortDirection::Descending), "");
        assert_eq!(view.recompute(&snap, &desc, &Favorites::new()), vec!["KRW-B", "KRW-C", "KRW-A"]);

        let asc = ViewQuery::new(SortState::new(SortColumn::Premium, SortDirection::Ascending), "");
        assert_eq!(view.recompute(&snap, &asc, &Favorites::new()), vec!["KRW-C", "KRW-B", "KRW-A"]);
    }

    #[test]
    fn test_ties_keep_previous_order() {
        let mut view = SortFilterView::new(catalog());
        let snap = snapshot(&[
            ("KRW-A", dec!(1), None),
            ("KRW-B", dec!(2), None),
            ("KRW-C", dec!(3), None),
        ]);
        let first = view.recompute(&snap, &by_price_desc(), &Favorites::new());
        assert_eq!(first, vec!["KRW-C", "KRW-B", "KRW-A"]);

        // 모두 같은 가격이 되어도 직전 순서 유지
        let flat = snapshot(&[
            ("KRW-A", dec!(5), None),
            ("KRW-B", dec!(5), None),
            ("KRW-C", dec!(5), None),
        ]);
        assert_eq!(view.recompute(&flat, &by_price_desc(), &Favorites::new()), first);
    }

    #[test]
    fn test_string_columns_case_insensitive() {
        let snap = snapshot(&[
            ("KRW-A", dec!(1), None),
            ("KRW-B", dec!(1), None),
            ("KRW-D", dec!(1), None),
        ]);
        let mut view = SortFilterView::new(catalog());
        let query = ViewQuery::new(SortState::new(SortColumn::EnglishName, SortDirection::Ascending), "");
        assert_eq!(
            view.recompute(&snap, &query, &Favorites::new()),
            vec!["KRW-A", "KRW-B", "KRW-D"]
        );
    }

    #[test]
    fn test_sort_toggle() {
        let mut sort = SortState::default();
        assert_eq!(sort.column, SortColumn::Volume);

        sort.toggle(SortColumn::Volume);
        assert_eq!(sort.direction, SortDirection::Ascending);

        sort.toggle(SortColumn::Premium);
        assert_eq!(sort, SortState::new(SortColumn::Premium, SortDirection::Descending));
    }

    #[test]
    fn test_sort_column_from_str() {
        assert_eq!("premium".parse::<SortColumn>().unwrap(), SortColumn::Premium);
        assert_eq!("PRICE".parse::<SortColumn>().unwrap(), SortColumn::TradePrice);
        assert!("unknown".parse::<SortColumn>().is_err());
        assert!(SortColumn::Premium.is_numeric());
        assert!(!SortColumn::Code.is_numeric());
    }
}
