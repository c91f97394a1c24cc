//! 가격/수량 계산을 위한 Decimal 유틸리티.

use rust_decimal::{Decimal, RoundingStrategy};

/// 가격 타입 (원화 또는 USDT).
pub type Price = Decimal;

/// 거래량/거래대금 타입.
pub type Volume = Decimal;

/// 퍼센트 타입 (9.0 = 9%).
pub type Percentage = Decimal;

/// 표시용 Decimal 확장 트레이트.
pub trait DecimalExt {
    /// 천 단위 구분자를 넣은 문자열로 변환합니다 (예: "100,000,000").
    ///
    /// 1 이상이면 정수로, 1 미만이면 유효숫자 4자리까지 표시합니다.
    fn to_krw_string(&self) -> String;

    /// 부호가 포함된 퍼센트 문자열로 변환합니다 (예: "+9.00%").
    fn to_signed_percent_string(&self) -> String;
}

impl DecimalExt for Decimal {
    fn to_krw_string(&self) -> String {
        let abs = self.abs();
        if abs < Decimal::ONE && !abs.is_zero() {
            let sig = self.round_sf(4).unwrap_or(*self);
            return sig.normalize().to_string();
        }

        let rounded = self
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .abs()
            .to_string();
        let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
        for (i, ch) in rounded.chars().enumerate() {
            if i > 0 && (rounded.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }

        if self.is_sign_negative() && !self.is_zero() {
            format!("-{}", grouped)
        } else {
            grouped
        }
    }

    fn to_signed_percent_string(&self) -> String {
        let rounded = self.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded > Decimal::ZERO {
            format!("+{:.2}%", rounded)
        } else {
            format!("{:.2}%", rounded)
        }
    }
}
