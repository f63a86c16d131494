//! Localized user-facing messages.

use crate::config::Language;

/// Messages shown to users when a request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Message {
    /// No network path is available.
    NoInternetConnection,
    /// Catch-all failure.
    UnknownError,
    /// A 401/406 arrived but no authorization provider was configured.
    AuthorizationProviderMissing,
    /// The server answered 500.
    InternalServerError,
    /// The caller cancelled the request.
    Cancelled,
    /// The request URL could not be built.
    InvalidUrl,
    /// The response body did not match the expected shape.
    DecodeFailed,
}

impl Message {
    /// Returns the text for `language`.
    pub fn text(&self, language: Language) -> &'static str {
        match language {
            Language::PtBr => self.pt_br(),
            Language::EnUs => self.en_us(),
        }
    }

    fn en_us(self) -> &'static str {
        match self {
            Self::NoInternetConnection => "You are without an internet connection.",
            Self::UnknownError => "Unknown error, please try again later.",
            Self::AuthorizationProviderMissing => "Authorization provider not implemented.",
            Self::InternalServerError => "Internal server error.",
            Self::Cancelled => "The request was cancelled.",
            Self::InvalidUrl => "Failed to build the request URL.",
            Self::DecodeFailed => "The server response could not be read.",
        }
    }

    fn pt_br(self) -> &'static str {
        match self {
            Self::NoInternetConnection => "Você está sem conexão com a internet.",
            Self::UnknownError => "Erro desconhecido, tente novamente mais tarde.",
            Self::AuthorizationProviderMissing => "Provedor de autorização não implementado.",
            Self::InternalServerError => "Erro interno do servidor.",
            Self::Cancelled => "A requisição foi cancelada.",
            Self::InvalidUrl => "Falha ao montar a URL da requisição.",
            Self::DecodeFailed => "Não foi possível ler a resposta do servidor.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_languages_have_text() {
        let all = [
            Message::NoInternetConnection,
            Message::UnknownError,
            Message::AuthorizationProviderMissing,
            Message::InternalServerError,
            Message::Cancelled,
            Message::InvalidUrl,
            Message::DecodeFailed,
        ];
        for message in all {
            assert!(!message.text(Language::EnUs).is_empty());
            assert!(!message.text(Language::PtBr).is_empty());
        }
    }

    #[test]
    fn test_no_internet_translations() {
        assert_eq!(
            Message::NoInternetConnection.text(Language::PtBr),
            "Você está sem conexão com a internet."
        );
        assert_eq!(
            Message::NoInternetConnection.text(Language::EnUs),
            "You are without an internet connection."
        );
    }
}
