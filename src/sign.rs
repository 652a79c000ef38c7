//! Detached CMS/PKCS#7 signature embedding (ISO 32000 §12.8, RFC 5652).
//!
//! Two-phase reserve-then-patch design: a signature dictionary with a
//! fixed-size `/Contents` hex slot and zeroed `/ByteRange` placeholders is
//! appended to the document first, so every other byte in the file is
//! already at its final offset; only then is the digest computed over the
//! two ranges bracketing the placeholder, the `SignedData` structure built
//! and signed, and the hex digits patched into the reserved slot in place.

use der::asn1::{GeneralizedTime, OctetString, SetOfVec};
use der::{Any, Encode};
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::RsaPrivateKey;
use sha2::{Digest, Sha256};
use x509_cert::Certificate;

use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{
    CertificateSet, DigestAlgorithmIdentifiers, EncapsulatedContentInfo, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use const_oid::ObjectIdentifier;
use spki::AlgorithmIdentifierOwned;
use x509_cert::attr::{Attribute, AttributeValue, Attributes};

use crate::error::{PdfCraftError, Result};
use crate::model::SignatureConfig;
use crate::rebuild::{self, insert_before_dict_close, rfind_bytes};
use crate::util::hexutil;

/// `id-data` (1.2.840.113549.1.7.1), the inner content type for a detached
/// signature with no embedded content.
const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// `id-signedData` (1.2.840.113549.1.7.2), the `ContentInfo` content type.
const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// `id-sha256` (2.16.840.1.101.3.4.2.1).
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// `rsaEncryption` (1.2.840.113549.1.1.1), used here as the PKCS#1 v1.5 signature algorithm.
const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
/// `id-contentType` (1.2.840.113549.1.9.3).
const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// `id-signingTime` (1.2.840.113549.1.9.5).
const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
/// `id-messageDigest` (1.2.840.113549.1.9.4).
const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

/// Size, in hex characters, of the reserved `/Contents` slot. Comfortably
/// larger than any detached CMS blob this signer produces (an RSA-2048
/// signature plus one certificate is a few KB at most).
const CONTENTS_SLOT_HEX_LEN: usize = 16384;
const BYTE_RANGE_PLACEHOLDER_WIDTH: usize = 10;

/// Signs `pdf` in place per `cfg`, returning the extended document with a
/// detached signature embedded. `cfg.certificate_pem`/`cfg.private_key_pem`
/// must each hold exactly one PEM-encoded block.
pub fn sign_in_place(pdf: Vec<u8>, cfg: &SignatureConfig) -> Result<Vec<u8>> {
    if !cfg.enabled {
        return Ok(pdf);
    }

    let certificate = parse_certificate(&cfg.certificate_pem)?;
    let private_key = parse_private_key(&cfg.private_key_pem)?;
    log::info!("signing document on page {} ({} byte input)", cfg.page, pdf.len());

    let parsed = rebuild::parse(&pdf)?;
    let next_id = parsed.objects.keys().copied().max().unwrap_or(0) + 1;
    let sig_dict_id = next_id;
    let widget_id = next_id + 1;
    let acroform_id = next_id + 2;

    let page_id = resolve_page_id(&parsed, cfg.page)?;

    let placeholder_contents = "0".repeat(CONTENTS_SLOT_HEX_LEN);
    let byte_range_placeholder = format!(
        "[ {} {} {} {} ]",
        zero_padded(0),
        zero_padded(0),
        zero_padded(0),
        zero_padded(0),
    );

    let sig_dict_body = format!(
        "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached \
         /ByteRange {byte_range} /Contents <{contents}> /Reason {reason} /Location {location} \
         /M {date} /Name {name} >>",
        byte_range = byte_range_placeholder,
        contents = placeholder_contents,
        reason = pdf_literal(cfg.reason.as_deref().unwrap_or("")),
        location = pdf_literal(cfg.location.as_deref().unwrap_or("")),
        date = pdf_literal(&pdf_date_now()),
        name = pdf_literal(cfg.name.as_deref().unwrap_or("")),
    );

    let [x0, y0, w, h] = [cfg.x, cfg.y, cfg.width, cfg.height];
    let widget_body = format!(
        "<< /Type /Annot /Subtype /Widget /FT /Sig /T (Signature1) /Rect [{} {} {} {}] /P {} 0 R /V {} 0 R /F {} >>",
        crate::util::num::format_real(x0),
        crate::util::num::format_real(y0),
        crate::util::num::format_real(x0 + w),
        crate::util::num::format_real(y0 + h),
        page_id,
        sig_dict_id,
        if cfg.visible { 4 } else { 2 }, // Print flag vs. Hidden flag
    );

    let acroform_body = format!(
        "<< /Fields [{widget_id} 0 R] /SigFlags 3 >>",
    );

    let mut page_body = parsed
        .objects
        .get(&page_id)
        .map(|o| o.body.clone())
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "signature target page not found".into() })?;
    splice_annot_into_page(&mut page_body, widget_id);

    let mut catalog_body = find_catalog_body(&parsed)?;
    insert_before_dict_close(&mut catalog_body, format!("/AcroForm {acroform_id} 0 R ").as_bytes());

    let mut rebuilt = rebuild::ParsedPdf {
        objects: parsed.objects,
        trailer: parsed.trailer,
    };
    let catalog_id = root_id(&rebuilt)?;
    rebuilt.objects.get_mut(&page_id).unwrap().body = page_body;
    rebuilt.objects.get_mut(&catalog_id).unwrap().body = catalog_body;
    rebuilt.objects.insert(sig_dict_id, rebuild::ParsedObject { gen: 0, body: sig_dict_body.into_bytes() });
    rebuilt.objects.insert(widget_id, rebuild::ParsedObject { gen: 0, body: widget_body.into_bytes() });
    rebuilt.objects.insert(acroform_id, rebuild::ParsedObject { gen: 0, body: acroform_body.into_bytes() });

    let mut out = rebuilt.reemit(&[], &[]);

    let sig_obj_header = format!("{sig_dict_id} 0 obj\n");
    let sig_obj_start = rfind_bytes(&out, sig_obj_header.as_bytes())
        .ok_or(PdfCraftError::PlaceholderMissing("signature object header"))?;

    let contents_tag_pos = rfind_bytes(&out[sig_obj_start..], b"/Contents <")
        .map(|rel| sig_obj_start + rel)
        .ok_or(PdfCraftError::PlaceholderMissing("/Contents"))?;
    let contents_hex_start = contents_tag_pos + b"/Contents <".len();
    let contents_hex_end = contents_hex_start + CONTENTS_SLOT_HEX_LEN;

    let byte_range_tag_pos = rfind_bytes(&out[sig_obj_start..contents_tag_pos], b"/ByteRange [ ")
        .map(|rel| sig_obj_start + rel)
        .ok_or(PdfCraftError::PlaceholderMissing("/ByteRange"))?;
    let byte_range_values_start = byte_range_tag_pos + b"/ByteRange [ ".len();

    let range1 = 0..contents_hex_start - 1; // up to and including the '<'
    let range2_start = contents_hex_end + 1; // past the closing '>'
    let range2 = range2_start..out.len();

    let mut hasher = Sha256::new();
    hasher.update(&out[range1.clone()]);
    hasher.update(&out[range2.clone()]);
    let digest = hasher.finalize();

    let signed_data = build_signed_data(&certificate, &private_key, &digest)?;
    let signed_data_bytes = signed_data.to_der().map_err(|e| PdfCraftError::Unsupported(format!("CMS encoding failed: {e}")))?;
    let signature_hex = hexutil::encode_upper(&signed_data_bytes);
    if signature_hex.len() > CONTENTS_SLOT_HEX_LEN {
        log::warn!("CMS SignedData ({} hex chars) exceeds the {CONTENTS_SLOT_HEX_LEN}-char reserved slot", signature_hex.len());
        return Err(PdfCraftError::SignatureTooLarge {
            needed: signature_hex.len(),
            available: CONTENTS_SLOT_HEX_LEN,
        });
    }
    let mut padded_hex = signature_hex;
    padded_hex.push_str(&"0".repeat(CONTENTS_SLOT_HEX_LEN - padded_hex.len()));
    out[contents_hex_start..contents_hex_end].copy_from_slice(padded_hex.as_bytes());

    let byte_range_text = format!(
        "{} {} {} {}",
        zero_padded(range1.start as u64),
        zero_padded(range1.end as u64),
        zero_padded(range2_start as u64),
        zero_padded((range2.end - range2_start) as u64),
    );
    out[byte_range_values_start..byte_range_values_start + byte_range_text.len()].copy_from_slice(byte_range_text.as_bytes());

    Ok(out)
}

fn zero_padded(v: u64) -> String {
    crate::util::num::pad_decimal(v, BYTE_RANGE_PLACEHOLDER_WIDTH)
}

fn pdf_literal(s: &str) -> String {
    format!("({})", crate::util::text::escape_literal_str(s))
}

fn pdf_date_now() -> String {
    let now = chrono::Local::now();
    format!("D:{}", now.format("%Y%m%d%H%M%S%z"))
}

fn parse_certificate(pem: &str) -> Result<Certificate> {
    use der::pem::PemLabel;
    let (label, der_bytes) = der::pem::decode_vec(pem.as_bytes())
        .map_err(|e| PdfCraftError::Unsupported(format!("invalid certificate PEM: {e}")))?;
    if label != Certificate::PEM_LABEL {
        return Err(PdfCraftError::Unsupported(format!("unexpected PEM label {label:?} for certificate")));
    }
    Certificate::from_der(&der_bytes).map_err(|e| PdfCraftError::Unsupported(format!("invalid certificate DER: {e}")))
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey> {
    use pkcs1::DecodeRsaPrivateKey;
    use pkcs8::DecodePrivateKey;
    // Accept both PKCS#8 ("BEGIN PRIVATE KEY") and PKCS#1 ("BEGIN RSA
    // PRIVATE KEY") PEM forms, per the `private_key_pem` contract. EC keys
    // are out of scope: the signer only ever builds RSA PKCS#1 v1.5
    // signatures.
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Ok(key);
    }
    RsaPrivateKey::from_pkcs1_pem(pem).map_err(|e| PdfCraftError::Unsupported(format!("invalid private key PEM: {e}")))
}

fn build_signed_data(certificate: &Certificate, key: &RsaPrivateKey, digest: &[u8]) -> Result<ContentInfo> {
    let digest_alg = AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: None,
    };

    let signed_attrs = build_signed_attributes(digest)?;
    let attrs_der = signed_attrs.to_der().map_err(|e| PdfCraftError::Unsupported(format!("attribute encoding failed: {e}")))?;

    let padding = Pkcs1v15Sign::new::<Sha256>();
    let attr_digest = Sha256::digest(&attrs_der);
    let signature_bytes = key
        .sign(padding, &attr_digest)
        .map_err(|e| PdfCraftError::Unsupported(format!("RSA signing failed: {e}")))?;

    let signer_info = SignerInfo {
        version: cms::signed_data::CmsVersion::V1,
        sid: SignerIdentifier::IssuerAndSerialNumber(cms::cert::IssuerAndSerialNumber {
            issuer: certificate.tbs_certificate.issuer.clone(),
            serial_number: certificate.tbs_certificate.serial_number.clone(),
        }),
        digest_alg: digest_alg.clone(),
        signed_attrs: Some(signed_attrs),
        signature_algorithm: AlgorithmIdentifierOwned {
            oid: OID_RSA_ENCRYPTION,
            parameters: None,
        },
        signature: OctetString::new(signature_bytes)
            .map_err(|e| PdfCraftError::Unsupported(format!("signature encoding failed: {e}")))?
            .into(),
        unsigned_attrs: None,
    };

    let mut digest_algorithms = DigestAlgorithmIdentifiers::new();
    digest_algorithms
        .insert(digest_alg)
        .map_err(|e| PdfCraftError::Unsupported(format!("digest algorithm set failed: {e}")))?;

    let mut certificates = CertificateSet::new();
    certificates
        .insert(CertificateChoices::Certificate(certificate.clone()))
        .map_err(|e| PdfCraftError::Unsupported(format!("certificate set failed: {e}")))?;

    let mut signer_infos = SignerInfos::new();
    signer_infos
        .insert(signer_info)
        .map_err(|e| PdfCraftError::Unsupported(format!("signer info set failed: {e}")))?;

    let signed_data = SignedData {
        version: cms::signed_data::CmsVersion::V1,
        digest_algorithms,
        encap_content_info: EncapsulatedContentInfo {
            econtent_type: OID_DATA,
            econtent: None,
        },
        certificates: Some(certificates),
        crls: None,
        signer_infos,
    };

    let content = Any::encode_from(&signed_data).map_err(|e| PdfCraftError::Unsupported(format!("SignedData encoding failed: {e}")))?;
    Ok(ContentInfo {
        content_type: OID_SIGNED_DATA,
        content,
    })
}

fn build_signed_attributes(digest: &[u8]) -> Result<Attributes> {
    let mut attrs = Attributes::new();
    attrs
        .insert(oid_attribute(OID_CONTENT_TYPE, &OID_DATA)?)
        .map_err(|e| PdfCraftError::Unsupported(format!("content-type attribute failed: {e}")))?;

    let now = chrono::Utc::now();
    let signing_time = GeneralizedTime::from_unix_duration(std::time::Duration::from_secs(now.timestamp().max(0) as u64))
        .map_err(|e| PdfCraftError::Unsupported(format!("signing time encoding failed: {e}")))?;
    attrs
        .insert(oid_attribute(OID_SIGNING_TIME, &signing_time)?)
        .map_err(|e| PdfCraftError::Unsupported(format!("signing-time attribute failed: {e}")))?;

    let digest_octets =
        OctetString::new(digest.to_vec()).map_err(|e| PdfCraftError::Unsupported(format!("digest encoding failed: {e}")))?;
    attrs
        .insert(oid_attribute(OID_MESSAGE_DIGEST, &digest_octets)?)
        .map_err(|e| PdfCraftError::Unsupported(format!("message-digest attribute failed: {e}")))?;

    Ok(attrs)
}

/// Builds a single-valued CMS `Attribute` from any DER-encodable value.
fn oid_attribute<T: Encode>(oid: ObjectIdentifier, value: &T) -> Result<Attribute> {
    let encoded: AttributeValue =
        Any::encode_from(value).map_err(|e| PdfCraftError::Unsupported(format!("attribute value encoding failed: {e}")))?;
    let mut values = SetOfVec::new();
    values
        .insert(encoded)
        .map_err(|e| PdfCraftError::Unsupported(format!("attribute value set failed: {e}")))?;
    Ok(Attribute { oid, values })
}

fn find_catalog_body(parsed: &rebuild::ParsedPdf) -> Result<Vec<u8>> {
    let id = rebuild::root_id(parsed)?;
    parsed
        .objects
        .get(&id)
        .map(|o| o.body.clone())
        .ok_or_else(|| PdfCraftError::Parse { offset: 0, message: "catalog object not found".into() })
}

fn resolve_page_id(parsed: &rebuild::ParsedPdf, page_number: u32) -> Result<u32> {
    rebuild::resolve_page_id(parsed, page_number)
}

fn splice_annot_into_page(body: &mut Vec<u8>, widget_id: u32) {
    rebuild::splice_annot_into_page(body, widget_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_padded_is_ten_digits() {
        assert_eq!(zero_padded(42).len(), 10);
        assert_eq!(zero_padded(42), "0000000042");
    }

    #[test]
    fn disabled_signature_is_a_no_op() {
        let pdf = b"1 0 obj\n<< /Type /Catalog >>\nendobj\ntrailer\n<< /Root 1 0 R >>\n%%EOF".to_vec();
        let cfg = SignatureConfig::default();
        let out = sign_in_place(pdf.clone(), &cfg).unwrap();
        assert_eq!(out, pdf);
    }

    #[test]
    fn splice_annot_handles_missing_and_existing_annots_arrays() {
        let mut no_annots = b"<< /Type /Page /Parent 2 0 R >>".to_vec();
        splice_annot_into_page(&mut no_annots, 9);
        assert!(String::from_utf8_lossy(&no_annots).contains("/Annots [9 0 R]"));

        let mut with_annots = b"<< /Type /Page /Annots [5 0 R] >>".to_vec();
        splice_annot_into_page(&mut with_annots, 9);
        let text = String::from_utf8_lossy(&with_annots);
        assert!(text.contains("5 0 R"));
        assert!(text.contains("9 0 R"));
    }
}
