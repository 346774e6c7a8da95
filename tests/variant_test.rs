mod common;

use anyhow::Result;
use billing_bus::{BusError, Interface, Procedure};
use common::{boot_with, Counter};
use std::sync::Arc;

struct JobsApi {
    execute: Procedure<String, String>,
}

struct MailApi {
    send: Procedure<String, bool>,
}

fn jobs() -> Arc<Interface<JobsApi>> {
    Arc::new(
        Interface::create("jobs", |scope| {
            Ok(JobsApi {
                execute: scope.procedure("execute")?,
            })
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_tagged_calls_only_reach_their_variant() -> Result<()> {
    let api = jobs();
    let email_calls = Counter::default();
    let sms_calls = Counter::default();

    let (app, _db) = {
        let api = Arc::clone(&api);
        let email_calls = email_calls.clone();
        let sms_calls = sms_calls.clone();
        boot_with(move |registrar| {
            let email = email_calls.clone();
            registrar
                .provide_named(&api, "send-email")
                .handle(&api.procedures.execute, move |to: String, _ctx, _bus| {
                    email.hit();
                    async move { Ok(format!("email:{}", to)) }
                })?;
            let sms = sms_calls.clone();
            registrar
                .provide_named(&api, "send-sms")
                .handle(&api.procedures.execute, move |to: String, _ctx, _bus| {
                    sms.hit();
                    async move { Ok(format!("sms:{}", to)) }
                })?;
            Ok(())
        })
        .await?
    };

    let (email, sms, tags) = app
        .execute(None, |bus| {
            let api = Arc::clone(&api);
            async move {
                let email = bus.get_interface(&api, "send-email")?;
                let sms = bus.get_interface(&api, "send-sms")?;
                let a = email.exec(&email.procedures().execute, "ops".to_string()).await?;
                let b = sms.exec(&api.procedures.execute, "ops".to_string()).await?;
                Ok((a, b, bus.variants(&api)))
            }
        })
        .await?;

    assert_eq!(email, "email:ops");
    assert_eq!(sms, "sms:ops");
    assert_eq!(tags, vec!["send-email", "send-sms"]);
    assert_eq!(email_calls.get(), 1);
    assert_eq!(sms_calls.get(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unknown_tag_is_no_such_handler() -> Result<()> {
    let api = jobs();
    let (app, _db) = {
        let api = Arc::clone(&api);
        boot_with(move |registrar| {
            registrar
                .provide_named(&api, "send-email")
                .handle(&api.procedures.execute, |to: String, _ctx, _bus| async move { Ok(to) })?;
            Ok(())
        })
        .await?
    };

    let err = app
        .execute(None, |bus| {
            let api = Arc::clone(&api);
            async move { bus.get_interface(&api, "send-sms").map(|v| v.tag().to_string()) }
        })
        .await
        .unwrap_err();

    match err {
        BusError::NoSuchHandler { interface, procedure, tag } => {
            assert_eq!(interface, "jobs");
            assert_eq!(procedure, None);
            assert_eq!(tag.as_deref(), Some("send-sms"));
        }
        other => panic!("unexpected error: {other}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_untagged_handler_is_not_a_fallback_for_variants() -> Result<()> {
    let api = jobs();
    let (app, _db) = {
        let api = Arc::clone(&api);
        boot_with(move |registrar| {
            registrar.register(&api.procedures.execute, |to: String, _ctx, _bus| async move {
                Ok(format!("default:{}", to))
            })
        })
        .await?
    };

    let (plain, variant) = app
        .execute(None, |bus| {
            let api = Arc::clone(&api);
            async move {
                let plain = bus.exec(&api.procedures.execute, "x".to_string()).await?;
                let variant = bus.get_interface(&api, "send-email").is_ok();
                Ok((plain, variant))
            }
        })
        .await?;

    assert_eq!(plain, "default:x");
    assert!(!variant);
    Ok(())
}

#[tokio::test]
async fn test_variant_rejects_procedures_of_other_interfaces() -> Result<()> {
    let api = jobs();
    let mail = Arc::new(Interface::create("mail", |scope| {
        Ok(MailApi {
            send: scope.procedure("send")?,
        })
    })?);

    let (app, _db) = {
        let api = Arc::clone(&api);
        let mail = Arc::clone(&mail);
        boot_with(move |registrar| {
            registrar
                .provide_named(&api, "send-email")
                .handle(&api.procedures.execute, |to: String, _ctx, _bus| async move { Ok(to) })?;
            registrar.register(&mail.procedures.send, |_: String, _ctx, _bus| async move { Ok(true) })
        })
        .await?
    };

    let err = app
        .execute(None, |bus| {
            let api = Arc::clone(&api);
            let mail = Arc::clone(&mail);
            async move {
                let variant = bus.get_interface(&api, "send-email")?;
                variant.exec(&mail.procedures.send, "ops".to_string()).await
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::ForeignProcedure { .. }));
    Ok(())
}
