/*
Simple i18n helper for the backend.

This module provides:
- A tiny embedded translations store for EN/DE/ES (compile-time embedded JSON).
- A simple `tr` function to lookup translations by key + optional params.
- `Accept-Language` negotiation against the supported languages.

Usage:
    use crate::i18n;
    let msg = i18n::tr(Some("de"), "redeem.already_used", Some(&[("number", "1234")]));

Notes:
- Placeholders in translation strings use single-brace format: `{name}`.
- Default language is `en`. If a key is missing for the requested language,
  the fallback language will be used.
*/

use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_LANG: &str = "en";

static TRANSLATIONS: OnceLock<HashMap<String, HashMap<String, String>>> = OnceLock::new();

const EN_JSON: &str = r#"
{
  "redeem.captcha_required": "Please complete captcha",
  "redeem.captcha_failed": "Captcha verification failed, please try again",
  "redeem.member_number_required": "Please enter at least one member number",
  "redeem.too_many_numbers": "You can enter at most {max} member numbers",
  "redeem.member_number_digits": "Member number must contain only digits",
  "redeem.repeated_member_number": "Verify repeated member number",
  "redeem.invalid_member_number": "Invalid member number {numbers}",
  "redeem.invalid_member_numbers": "Invalid member numbers {numbers}",
  "redeem.invalid_request": "Invalid request",
  "redeem.already_used": "Number {number} has already used the discount for this event",
  "redeem.no_discount": "There is no discount available for this ticket",
  "discount.field_required": "This field is required.",
  "discount.name_too_long": "Ensure this value has at most {max} characters (it has {len}).",
  "discount.value_not_number": "Enter a number.",
  "discount.invalid_type": "Select a valid choice. {value} is not one of the available choices.",
  "discount.min_value": "Ensure this value is greater than or equal to {min}.",
  "discount.max_value": "Ensure this value is less than or equal to {max}.",
  "discount.event_exists": "You already have a discount for this event",
  "discount.free_event": "You can not create a discount in a free event",
  "discount.free_ticket": "You can not create a discount for a free ticket",
  "discount.ticket_exists": "You have already used a discount for this ticket",
  "discount.delete_confirm": "Are you sure you want to delete the discount",
  "discount.type.fixed": "Fixed Discount $",
  "discount.type.percentage": "Percentage Discount %",
  "event.no_paid_tickets": "It doesn't have any paid ticket",
  "access.event_denied": "You don't have access to this event",
  "access.discount_denied": "You don't have access to this discount",
  "access.discount_event_mismatch": "The discount does not match the event",
  "not_found.event": "Event not found",
  "not_found.ticket_type": "Ticket type not found",
  "not_found.discount": "Discount not found",
  "not_found.organizer": "Organizer not found",
  "auth.logged_out": "Logged out",
  "error.unsupported_language": "Unsupported language: {lang}",
  "app.name": "Member Discounts"
}
"#;

const DE_JSON: &str = r#"
{
  "redeem.captcha_required": "Bitte das Captcha ausfüllen",
  "redeem.captcha_failed": "Captcha-Prüfung fehlgeschlagen, bitte erneut versuchen",
  "redeem.member_number_required": "Bitte mindestens eine Mitgliedsnummer eingeben",
  "redeem.too_many_numbers": "Es können höchstens {max} Mitgliedsnummern eingegeben werden",
  "redeem.member_number_digits": "Die Mitgliedsnummer darf nur Ziffern enthalten",
  "redeem.repeated_member_number": "Bitte doppelte Mitgliedsnummer prüfen",
  "redeem.invalid_member_number": "Ungültige Mitgliedsnummer {numbers}",
  "redeem.invalid_member_numbers": "Ungültige Mitgliedsnummern {numbers}",
  "redeem.invalid_request": "Ungültige Anfrage",
  "redeem.already_used": "Die Nummer {number} hat den Rabatt für diese Veranstaltung bereits genutzt",
  "redeem.no_discount": "Für dieses Ticket ist kein Rabatt verfügbar",
  "discount.field_required": "Dieses Feld ist zwingend erforderlich.",
  "discount.name_too_long": "Bitte sicherstellen, dass der Wert aus höchstens {max} Zeichen besteht (er besteht aus {len}).",
  "discount.value_not_number": "Bitte eine Zahl eingeben.",
  "discount.invalid_type": "Bitte eine gültige Auswahl treffen. {value} ist keine gültige Auswahl.",
  "discount.min_value": "Dieser Wert muss größer oder gleich {min} sein.",
  "discount.max_value": "Dieser Wert muss kleiner oder gleich {max} sein.",
  "discount.event_exists": "Für diese Veranstaltung gibt es bereits einen Rabatt",
  "discount.free_event": "Für eine kostenlose Veranstaltung kann kein Rabatt erstellt werden",
  "discount.free_ticket": "Für ein kostenloses Ticket kann kein Rabatt erstellt werden",
  "discount.ticket_exists": "Für dieses Ticket gibt es bereits einen Rabatt",
  "discount.delete_confirm": "Soll der Rabatt wirklich gelöscht werden",
  "discount.type.fixed": "Fester Rabatt $",
  "discount.type.percentage": "Prozentualer Rabatt %",
  "event.no_paid_tickets": "Es gibt keine kostenpflichtigen Tickets",
  "access.event_denied": "Kein Zugriff auf diese Veranstaltung",
  "access.discount_denied": "Kein Zugriff auf diesen Rabatt",
  "access.discount_event_mismatch": "Der Rabatt gehört nicht zu dieser Veranstaltung",
  "not_found.event": "Veranstaltung nicht gefunden",
  "not_found.ticket_type": "Tickettyp nicht gefunden",
  "not_found.discount": "Rabatt nicht gefunden",
  "not_found.organizer": "Veranstalter nicht gefunden",
  "auth.logged_out": "Abgemeldet",
  "error.unsupported_language": "Nicht unterstützte Sprache: {lang}",
  "app.name": "Mitgliederrabatte"
}
"#;

const ES_JSON: &str = r#"
{
  "redeem.captcha_required": "Por favor complete el captcha",
  "redeem.captcha_failed": "La verificación del captcha falló, intente nuevamente",
  "redeem.member_number_required": "Ingrese al menos un número de socio",
  "redeem.too_many_numbers": "Puede ingresar como máximo {max} números de socio",
  "redeem.member_number_digits": "El número de socio solo puede contener dígitos",
  "redeem.repeated_member_number": "Verifique el número de socio repetido",
  "redeem.invalid_member_number": "Número de socio inválido {numbers}",
  "redeem.invalid_member_numbers": "Números de socio inválidos {numbers}",
  "redeem.invalid_request": "Solicitud inválida",
  "redeem.already_used": "El número {number} ya utilizó el descuento para este evento",
  "redeem.no_discount": "No hay descuento disponible para esta entrada",
  "discount.field_required": "Este campo es obligatorio.",
  "discount.name_too_long": "Asegúrese de que este valor tenga como máximo {max} caracteres (tiene {len}).",
  "discount.value_not_number": "Introduzca un número.",
  "discount.invalid_type": "Escoja una opción válida. {value} no es una de las opciones disponibles.",
  "discount.min_value": "Asegúrese de que este valor es mayor o igual a {min}.",
  "discount.max_value": "Asegúrese de que este valor es menor o igual a {max}.",
  "discount.event_exists": "Ya tiene un descuento para este evento",
  "discount.free_event": "No puede crear un descuento en un evento gratuito",
  "discount.free_ticket": "No puede crear un descuento para una entrada gratuita",
  "discount.ticket_exists": "Ya tiene un descuento para esta entrada",
  "discount.delete_confirm": "¿Está seguro de que desea eliminar el descuento",
  "discount.type.fixed": "Descuento fijo $",
  "discount.type.percentage": "Descuento porcentual %",
  "event.no_paid_tickets": "No tiene ninguna entrada paga",
  "access.event_denied": "No tiene acceso a este evento",
  "access.discount_denied": "No tiene acceso a este descuento",
  "access.discount_event_mismatch": "El descuento no corresponde al evento",
  "not_found.event": "Evento no encontrado",
  "not_found.ticket_type": "Tipo de entrada no encontrado",
  "not_found.discount": "Descuento no encontrado",
  "not_found.organizer": "Organizador no encontrado",
  "auth.logged_out": "Sesión cerrada",
  "error.unsupported_language": "Idioma no soportado: {lang}",
  "app.name": "Descuentos para socios"
}
"#;

/// Initialize translations map (lazy).
fn build_translations() -> HashMap<String, HashMap<String, String>> {
    let mut out: HashMap<String, HashMap<String, String>> = HashMap::new();

    for (lang, json) in [("en", EN_JSON), ("de", DE_JSON), ("es", ES_JSON)] {
        let map: HashMap<String, String> = serde_json::from_str(json).unwrap_or_else(|e| {
            panic!("failed to parse {} translations in i18n module: {}", lang, e);
        });
        out.insert(lang.to_string(), map);
    }

    out
}

/// Returns the global translations map (lang -> (key -> message)).
fn translations() -> &'static HashMap<String, HashMap<String, String>> {
    TRANSLATIONS.get_or_init(build_translations)
}

/// Normalize a language tag into a short, lowercase code (e.g. "de-AT" -> "de").
pub fn normalize_language(lang: &str) -> String {
    lang.split(['-', '_'])
        .next()
        .unwrap_or(lang)
        .trim()
        .to_lowercase()
}

/// Returns true if the given language code is supported ("en", "de", "es").
pub fn is_supported_language(lang: &str) -> bool {
    translations().contains_key(lang)
}

/// Pick the first supported language out of an `Accept-Language` header value.
pub fn negotiate(accept_language: &str) -> Option<String> {
    accept_language
        .split(',')
        .map(|part| part.split(';').next().unwrap_or(part))
        .map(normalize_language)
        .find(|lang| is_supported_language(lang))
}

/// Translate a key using an explicit language (or default if None).
///
/// Returns the translated and parameter-substituted string. If no translation is found,
/// returns the default language value or the key itself.
pub fn tr(lang: Option<&str>, key: &str, params: Option<&[(&str, &str)]>) -> String {
    let map = translations();

    let desired = lang.unwrap_or(DEFAULT_LANG);

    let val = map
        .get(desired)
        .and_then(|m| m.get(key))
        .cloned()
        .or_else(|| map.get(DEFAULT_LANG).and_then(|m| m.get(key)).cloned())
        .unwrap_or_else(|| key.to_string());

    if let Some(params) = params {
        let mut s = val;
        for (k, v) in params {
            s = s.replace(&format!("{{{}}}", k), v);
        }
        s
    } else {
        val
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tr_basic() {
        let s = tr(Some("en"), "redeem.captcha_required", None);
        assert_eq!(s, "Please complete captcha");
    }

    #[test]
    fn test_tr_with_params() {
        let s = tr(Some("en"), "redeem.already_used", Some(&[("number", "1234")]));
        assert_eq!(s, "Number 1234 has already used the discount for this event");

        let s = tr(Some("de"), "discount.max_value", Some(&[("max", "100")]));
        assert!(s.contains("100"));
    }

    #[test]
    fn test_fallback_to_default() {
        let s = tr(Some("fr"), "discount.free_event", None);
        assert_eq!(s, "You can not create a discount in a free event");
    }

    #[test]
    fn missing_key_returns_key() {
        let k = "non.existent.key";
        assert_eq!(tr(None, k, None), k.to_string());
    }

    #[test]
    fn every_language_has_every_key() {
        let map = translations();
        let en = &map["en"];
        for lang in ["de", "es"] {
            for key in en.keys() {
                assert!(map[lang].contains_key(key), "{} is missing {}", lang, key);
            }
        }
    }

    #[test]
    fn test_is_supported_language() {
        assert!(is_supported_language("en"));
        assert!(is_supported_language("de"));
        assert!(is_supported_language("es"));
        assert!(!is_supported_language("ru"));
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("en-US"), "en");
        assert_eq!(normalize_language("de_AT"), "de");
        assert_eq!(normalize_language("ES"), "es");
    }

    #[test]
    fn negotiate_picks_first_supported() {
        assert_eq!(negotiate("fr-FR,fr;q=0.9,de;q=0.8"), Some("de".to_string()));
        assert_eq!(negotiate("ru"), None);
    }
}
