//! A two-peer swarm over loopback TCP: one peer already holds the file,
//! the other starts empty and must finish with a byte-identical copy.

mod common;

use std::time::Duration;

#[tokio::test]
async fn leecher_downloads_the_whole_file_from_a_single_seed() {
    let file_name = format!("itest_two_peer_{}.dat", std::process::id());
    let content: Vec<u8> = (0..48u8).cycle().take(40).collect();
    common::seed_file(&file_name, &content);

    let port = common::base_port(1);
    let seed_id = 9101;
    let leech_id = 9102;

    let config = common::build_config(
        &file_name,
        content.len() as u64,
        16,
        1,
        vec![
            common::peer(seed_id, port, true),
            common::peer(leech_id, port + 1, false),
        ],
    );

    let seed = tokio::spawn(p2p_file_swarm::run(seed_id, config.clone()));
    let leech = tokio::spawn(p2p_file_swarm::run(leech_id, config));

    let result = tokio::time::timeout(Duration::from_secs(15), async {
        let (seed_result, leech_result) = tokio::join!(seed, leech);
        seed_result.unwrap().unwrap();
        leech_result.unwrap().unwrap();
    })
    .await;

    let downloaded = std::fs::read(common::downloaded_path(leech_id, &file_name));

    common::cleanup(&file_name, &[seed_id, leech_id]);

    result.expect("swarm did not terminate in time");
    assert_eq!(downloaded.unwrap(), content);
}
