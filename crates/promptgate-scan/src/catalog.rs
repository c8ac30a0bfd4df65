//! `(kind, language) -> template` lookup with an `en` fallback.

use crate::lang::Lang;
use promptgate_error::ErrorKind;
use std::collections::HashMap;

/// A template containing at most one `{reason}` placeholder.
#[derive(Debug, Clone)]
pub struct Template(&'static str);

impl Template {
    pub fn render(&self, reason: &str) -> String {
        if self.0.contains("{reason}") {
            self.0.replace("{reason}", reason)
        } else {
            self.0.to_string()
        }
    }
}

/// Static localized message templates, keyed by `(ErrorKind, Lang)`.
///
/// Missing `(kind, lang)` falls back to `(kind, en)`. A missing `kind`
/// entirely is a programming error and `render` panics rather than
/// returning a silently wrong string; every variant of `ErrorKind` has an
/// `en` entry below, so this can only happen if a new kind is added
/// without updating this table.
pub struct ErrorCatalog {
    entries: HashMap<(ErrorKind, Lang), &'static str>,
}

macro_rules! entries {
    ($($kind:expr, $lang:expr => $msg:expr;)*) => {{
        let mut m = HashMap::new();
        $(m.insert(($kind, $lang), $msg);)*
        m
    }};
}

impl Default for ErrorCatalog {
    fn default() -> Self {
        use ErrorKind::*;
        use Lang::*;
        let entries = entries! {
            PromptBlocked, En => "Your input was blocked by a security scanner. Reason: {reason}";
            PromptBlocked, Zh => "您的输入被安全扫描器阻止。原因: {reason}";
            PromptBlocked, Ja => "入力はセキュリティスキャナーによってブロックされました。理由: {reason}";
            PromptBlocked, Ko => "입력이 보안 스캐너에 의해 차단되었습니다. 이유: {reason}";
            PromptBlocked, Ru => "Ваш ввод заблокирован сканером безопасности. Причина: {reason}";
            PromptBlocked, Ar => "تم حظر إدخالك بواسطة ماسح أمني. السبب: {reason}";
            PromptBlocked, Vi => "Đầu vào của bạn đã bị chặn bởi trình quét bảo mật. Lý do: {reason}";

            ResponseBlocked, En => "Model output was blocked by a security scanner. Reason: {reason}";
            ResponseBlocked, Zh => "模型输出被安全扫描器阻止。原因: {reason}";
            ResponseBlocked, Ja => "モデルの出力はセキュリティスキャナーによってブロックされました。理由: {reason}";
            ResponseBlocked, Ko => "모델 출력이 보안 스캐너에 의해 차단되었습니다. 이유: {reason}";
            ResponseBlocked, Ru => "Ответ модели заблокирован сканером безопасности. Причина: {reason}";
            ResponseBlocked, Ar => "تم حظر مخرجات النموذج بواسطة ماسح أمني. السبب: {reason}";
            ResponseBlocked, Vi => "Đầu ra của mô hình đã bị chặn bởi trình quét bảo mật. Lý do: {reason}";

            ServerBusy, En => "The server is busy handling other requests for this model. Please retry shortly.";
            ServerBusy, Zh => "服务器正忙于处理该模型的其他请求，请稍后重试。";
            ServerBusy, Ja => "サーバーはこのモデルの他のリクエストを処理中です。しばらくしてから再試行してください。";
            ServerBusy, Ko => "서버가 이 모델에 대한 다른 요청을 처리 중입니다. 잠시 후 다시 시도하세요.";
            ServerBusy, Ru => "Сервер занят обработкой других запросов для этой модели. Повторите попытку позже.";
            ServerBusy, Ar => "الخادم مشغول بمعالجة طلبات أخرى لهذا النموذج. يرجى المحاولة لاحقًا.";
            ServerBusy, Vi => "Máy chủ đang bận xử lý các yêu cầu khác cho mô hình này. Vui lòng thử lại sau.";

            RequestTimeout, En => "The request exceeded its deadline.";
            RequestTimeout, Zh => "请求超出了截止时间。";

            UpstreamError, En => "The backend model server returned an error.";
            UpstreamError, Zh => "后端模型服务器返回了错误。";

            AccessDenied, En => "Access denied: this client is not on the allow-list.";
            AccessDenied, Zh => "访问被拒绝：该客户端不在允许列表中。";

            ScannerError, En => "A content scanner failed to complete in time.";
            BadRequest, En => "The request could not be parsed.";
            InternalError, En => "An internal error occurred.";
        };
        Self { entries }
    }
}

impl ErrorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render the localized message for `kind`/`lang`, substituting
    /// `reason` into the template's `{reason}` placeholder if present.
    pub fn render(&self, kind: ErrorKind, lang: Lang, reason: &str) -> String {
        let template = self
            .entries
            .get(&(kind, lang))
            .or_else(|| self.entries.get(&(kind, Lang::En)))
            .unwrap_or_else(|| {
                panic!(
                    "error catalog missing an `en` entry for {kind:?}; this is a programming error"
                )
            });
        Template(template).render(reason)
    }
}
