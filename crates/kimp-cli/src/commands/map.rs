//! Upbit 마켓 코드의 Binance 매핑 확인.

use kimp_core::{binance_stream_name, is_krw_market, to_binance_symbol, BinanceStreamKind};

/// 마켓 코드 하나의 매핑 결과를 한 줄로 만듭니다.
pub fn describe_mapping(code: &str, kind: BinanceStreamKind) -> String {
    let code = code.trim().to_uppercase();

    if !is_krw_market(&code) {
        return format!("{:<12} -  원화 마켓이 아님", code);
    }

    match to_binance_symbol(&code) {
        Some(symbol) => format!(
            "{:<12} -> {:<12} ({})",
            code,
            symbol,
            binance_stream_name(&symbol, kind)
        ),
        None => format!("{:<12} -  Binance 대응 없음", code),
    }
}

/// 여러 코드의 매핑을 출력합니다.
pub fn print_mappings(codes: &[String], kind: BinanceStreamKind) {
    for code in codes {
        println!("{}", describe_mapping(code, kind));
    }
}
