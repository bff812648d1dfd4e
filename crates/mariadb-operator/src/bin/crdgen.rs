use kube::core::CustomResourceExt;
use mariadb_operator::crds::mariadb::MariaDB;

fn main() {
    println!(
        "{}",
        serde_yaml::to_string(&MariaDB::crd()).expect("serialize crd")
    );
}
