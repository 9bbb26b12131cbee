/**
 * DÉCODEUR DE PAYLOADS - Normalisation des mesures capteurs
 *
 * RÔLE : Transforme un payload MQTT brut en résultat typé. Les capteurs
 * publient des formats hétérogènes : nombre nu ("23.5"), objet plat
 * ({"message": "23.5"}) ou objet imbriqué ({"message": {"message": 23.5}}).
 *
 * FONCTIONNEMENT : Fonction pure, aucune I/O. Seuls les nombres finis
 * deviennent des échantillons ; NaN et ±inf sont traités comme indécodables.
 */

use serde_json::Value;

/// Résultat du décodage d'un payload entrant.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Nombre fini exploitable comme échantillon.
    Number(f64),
    /// Valeur structurée valide mais non numérique (diagnostic, statut...).
    Passthrough(Value),
    /// Payload inexploitable.
    Undecodable,
}

/// Décode un payload brut en suivant la cascade : JSON imbriqué, JSON plat,
/// JSON scalaire, puis chaîne numérique nue.
pub fn decode(payload: &[u8]) -> Decoded {
    let text = String::from_utf8_lossy(payload);
    let trimmed = text.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => decode_json(value),
        // pas du JSON : dernière chance en nombre nu
        Err(_) => parse_number(trimmed),
    }
}

fn decode_json(value: Value) -> Decoded {
    if let Value::Object(obj) = &value {
        if let Some(inner) = obj.get("message") {
            // forme imbriquée {"message": {"message": x}} : le champ est
            // retourné tel quel, numérique ou non
            if let Some(nested) = inner.as_object().and_then(|m| m.get("message")) {
                return match finite(nested) {
                    Some(v) => Decoded::Number(v),
                    None => Decoded::Passthrough(nested.clone()),
                };
            }
            // forme plate {"message": x} : on tente la conversion en nombre
            return match numeric(inner) {
                Some(v) => Decoded::Number(v),
                None => Decoded::Passthrough(inner.clone()),
            };
        }
        // objet sans champ message : rien à mesurer
        return Decoded::Undecodable;
    }

    match numeric(&value) {
        Some(v) => Decoded::Number(v),
        None => Decoded::Undecodable,
    }
}

/// Nombre JSON fini, sans coercition de chaîne.
fn finite(value: &Value) -> Option<f64> {
    value.as_f64().filter(|v| v.is_finite())
}

/// Nombre JSON fini, ou chaîne qui se parse en nombre fini.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(_) => finite(value),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => None,
        },
        _ => None,
    }
}

fn parse_number(text: &str) -> Decoded {
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() => Decoded::Number(v),
        _ => Decoded::Undecodable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_number() {
        assert_eq!(decode(b"23.5"), Decoded::Number(23.5));
        assert_eq!(decode(b" 42 "), Decoded::Number(42.0));
        assert_eq!(decode(b"-7"), Decoded::Number(-7.0));
    }

    #[test]
    fn test_flat_message_object() {
        assert_eq!(decode(br#"{"message": 55}"#), Decoded::Number(55.0));
        assert_eq!(decode(br#"{"message": "55.5"}"#), Decoded::Number(55.5));
        assert_eq!(
            decode(br#"{"message": "calibrating"}"#),
            Decoded::Passthrough(json!("calibrating"))
        );
    }

    #[test]
    fn test_nested_message_object() {
        assert_eq!(decode(br#"{"message": {"message": 95}}"#), Decoded::Number(95.0));
        // dans la forme imbriquée la chaîne n'est pas convertie
        assert_eq!(
            decode(br#"{"message": {"message": "95"}}"#),
            Decoded::Passthrough(json!("95"))
        );
    }

    #[test]
    fn test_object_without_message_field() {
        assert_eq!(decode(br#"{"status": "ok"}"#), Decoded::Undecodable);
    }

    #[test]
    fn test_json_scalar_forms() {
        assert_eq!(decode(br#""12.25""#), Decoded::Number(12.25));
        assert_eq!(decode(br#""not a number""#), Decoded::Undecodable);
        assert_eq!(decode(b"true"), Decoded::Undecodable);
    }

    #[test]
    fn test_garbage_is_undecodable() {
        assert_eq!(decode(b"hello world"), Decoded::Undecodable);
        assert_eq!(decode(b""), Decoded::Undecodable);
        assert_eq!(decode(&[0xff, 0xfe, 0x00]), Decoded::Undecodable);
    }

    #[test]
    fn test_non_finite_never_becomes_number() {
        assert_eq!(decode(b"NaN"), Decoded::Undecodable);
        assert_eq!(decode(b"inf"), Decoded::Undecodable);
        assert_eq!(decode(b"-inf"), Decoded::Undecodable);
    }
}
