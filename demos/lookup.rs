//! Looks up the addresses and TXT records of host names.
//!
//! Usage: lookup [OPTIONS] <hostname>...
//!
//! Options:
//!   +vc     query the name servers over TCP only
//!   +ipv4   only look up IPv4 addresses
//!   +ipv6   only look up IPv6 addresses
use domain_evresolv::conf::{system_conf, ResolvConf};
use domain_evresolv::{lookup, Env, Family, LookupOptions, Resolver};
use std::env;
use tokio::task::LocalSet;

async fn forward(env: &Env, resolver: &Resolver, name: &str, family: Family) {
    match lookup(env, name, LookupOptions::new(family, true)).await {
        Ok(addrs) => {
            for addr in addrs {
                println!("{} has address {}", name, addr);
            }
        }
        Err(err) => println!("Error: {}", err),
    }
    match resolver.resolve_txt(name).await {
        Ok(records) => {
            for record in records {
                println!("{} descriptive text \"{}\"", name, record.concat());
            }
        }
        Err(err) => println!("Error: {}", err),
    }
}

fn parse_queryopt(conf: &mut ResolvConf, family: &mut Family, arg: &str) {
    match arg {
        "+vc" => conf.options.use_vc = true,
        "+ipv4" => *family = Family::V4,
        "+ipv6" => *family = Family::V6,
        _ => {
            println!("Warning: ignoring unknown query option {}", arg);
        }
    }
}

fn main() {
    let mut conf = system_conf().clone();
    let mut family = Family::Any;
    let mut names = Vec::new();
    for arg in env::args().skip(1) {
        if arg.starts_with('+') {
            parse_queryopt(&mut conf, &mut family, &arg)
        } else {
            names.push(arg)
        }
    }
    if names.is_empty() {
        println!("Usage: lookup [OPTIONS] <hostname>...");
        return;
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    LocalSet::new().block_on(&rt, async move {
        let env = Env::new();
        let resolver = match Resolver::with_conf(&env, &conf) {
            Ok(resolver) => resolver,
            Err(err) => {
                println!("Error: {}", err);
                return;
            }
        };
        for name in names {
            forward(&env, &resolver, &name, family).await;
        }
        env.teardown().await;
    });
}
