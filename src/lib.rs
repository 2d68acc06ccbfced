// Settlement Reconciliation - Core Library
// POS sales ↔ SumUp / TWINT settlement reports ↔ CAMT.053 bank statements

pub mod money;
pub mod calendar;
pub mod model;
pub mod error;
pub mod config;
pub mod signatures;  // Bank narrative → provider
pub mod parser;      // SumUp CSV, TWINT CSV, CAMT.053 XML
pub mod normalize;
pub mod balance;     // Statement opening/closing check
pub mod matching;    // Sale ↔ settlement ↔ bank entry
pub mod import;      // run_import orchestrator
pub mod indicator;

// Re-export commonly used types
pub use money::{Money, LOCAL_CURRENCY};
pub use calendar::{parse_date, DateRange};
pub use model::{
    BankEntry, BankLink, EntryProvider, MatchBasis, MatchCandidate, MatchState,
    PaymentMethod, PosSale, Provider, SaleReconciliation, SettlementStatus,
    SettlementTransaction,
};
pub use error::{
    DataQualityWarning, FileFatalError, ImportError, ParseError, RowParseError, WarningKind,
};
pub use config::{MatchingConfig, ProviderSettings};
pub use signatures::{ProviderSignature, SignatureRegistry};
pub use parser::{
    get_parser, parse, AmountValidator, DateNormalizer, ParseOutcome, RawRecord,
    SourceFormat, StatementParser,
};
pub use balance::{check_statement, BalanceReport, BalanceResult};
pub use matching::{MatchingEngine, MatchingOutcome};
pub use import::{
    run_import, ChargebackRecord, ImportOrchestrator, ImportResult, ImportSummary,
    SettlementBankLink, UploadedFile,
};
pub use indicator::{indicator_for, indicator_for_confidence, MatchIndicator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
